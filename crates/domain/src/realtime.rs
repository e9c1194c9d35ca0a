use serde::{Deserialize, Serialize};

use crate::support::SupportStatus;

/// Summary pushed with `new_message` / `message_sent`. `item` is the
/// serialized message, transfer, or request record so clients can render
/// without a re-fetch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageEventPayload {
    pub thread_id: String,
    pub item: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SupportEventPayload {
    pub request_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: SupportStatus,
    pub thread_id: Option<String>,
}

/// Server -> client event catalog. One envelope per connection delivery; a
/// user with N devices receives every event N times.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    NewMessage(MessageEventPayload),
    MessageSent(MessageEventPayload),
    MessageRead {
        thread_id: String,
        message_id: String,
        reader_id: String,
    },
    UserTyping {
        thread_id: String,
        user_id: String,
        is_typing: bool,
    },
    ThreadJoined {
        thread_id: String,
        user_id: String,
    },
    ThreadLeft {
        thread_id: String,
        user_id: String,
    },
    SupportRequestCreated(SupportEventPayload),
    SupportRequestAccepted(SupportEventPayload),
    SupportRequestRejected(SupportEventPayload),
    SupportRequestCancelled(SupportEventPayload),
    SupportRequestClosed(SupportEventPayload),
    SupportRequestReported(SupportEventPayload),
    ThreadJoinError {
        thread_id: String,
        reason: String,
    },
    MessageSendError {
        reason: String,
    },
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::NewMessage(_) => "new_message",
            PushEvent::MessageSent(_) => "message_sent",
            PushEvent::MessageRead { .. } => "message_read",
            PushEvent::UserTyping { .. } => "user_typing",
            PushEvent::ThreadJoined { .. } => "thread_joined",
            PushEvent::ThreadLeft { .. } => "thread_left",
            PushEvent::SupportRequestCreated(_) => "support_request_created",
            PushEvent::SupportRequestAccepted(_) => "support_request_accepted",
            PushEvent::SupportRequestRejected(_) => "support_request_rejected",
            PushEvent::SupportRequestCancelled(_) => "support_request_cancelled",
            PushEvent::SupportRequestClosed(_) => "support_request_closed",
            PushEvent::SupportRequestReported(_) => "support_request_reported",
            PushEvent::ThreadJoinError { .. } => "thread_join_error",
            PushEvent::MessageSendError { .. } => "message_send_error",
        }
    }
}
