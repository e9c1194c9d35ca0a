use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::jobs::{JobDefaults, NotificationJobPayload, new_job, now_ms};
use crate::ports::jobs::{JobQueue, JobType};
use crate::ports::realtime::EventPublisher;
use crate::ports::threads::ThreadRepository;
use crate::realtime::{MessageEventPayload, PushEvent};

const MAX_BODY_LENGTH: usize = 2_000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageContext {
    #[default]
    Dm,
    Support,
}

/// Discriminates user-authored messages from the courtesy notice recorded
/// beside a token transfer. Timelines drop `TipNotice` rows so a tip is
/// never represented twice.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    User,
    TipNotice,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    pub thread_id: String,
    pub user_one_id: String,
    pub user_two_id: String,
    pub is_support_thread: bool,
    pub is_active: bool,
    pub unread_count_user_one: u32,
    pub unread_count_user_two: u32,
    pub started_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Thread {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.user_one_id == user_id || self.user_two_id == user_id
    }

    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.user_one_id == user_id {
            Some(&self.user_two_id)
        } else if self.user_two_id == user_id {
            Some(&self.user_one_id)
        } else {
            None
        }
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        if self.user_one_id == user_id {
            self.unread_count_user_one
        } else if self.user_two_id == user_id {
            self.unread_count_user_two
        } else {
            0
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    /// Legacy rows predate the context column; they deserialize as `dm`.
    #[serde(default)]
    pub context: MessageContext,
    #[serde(default)]
    pub kind: MessageKind,
    pub is_read: bool,
    pub sent_at_ms: i64,
    pub request_id: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct SendMessageInput {
    pub thread_id: String,
    pub body: String,
    pub context: MessageContext,
    pub kind: MessageKind,
    pub request_id: String,
    pub correlation_id: String,
    pub occurred_at_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread: Thread,
    pub unread_count: u32,
}

#[derive(Clone)]
pub struct ThreadService {
    repository: Arc<dyn ThreadRepository>,
    publisher: Arc<dyn EventPublisher>,
    notifications: Option<Arc<dyn JobQueue>>,
}

impl ThreadService {
    pub fn new(
        repository: Arc<dyn ThreadRepository>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Option<Arc<dyn JobQueue>>,
    ) -> Self {
        Self {
            repository,
            publisher,
            notifications,
        }
    }

    pub fn repository(&self) -> Arc<dyn ThreadRepository> {
        self.repository.clone()
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.publisher.clone()
    }

    /// Returns the single primary thread for the pair, creating it when
    /// absent. A racing create loses to the repository uniqueness check and
    /// re-reads the winner's row instead of inserting a duplicate.
    pub async fn get_or_create_primary(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> DomainResult<Thread> {
        let (user_a, user_b) = validate_participant_pair(user_a, user_b)?;
        if let Some(thread) = self
            .repository
            .find_primary_by_participants(&user_a, &user_b)
            .await?
        {
            return Ok(thread);
        }

        let now = now_ms();
        let thread = Thread {
            thread_id: crate::util::uuid_v7_without_dashes(),
            user_one_id: user_a.clone(),
            user_two_id: user_b.clone(),
            is_support_thread: false,
            is_active: true,
            unread_count_user_one: 0,
            unread_count_user_two: 0,
            started_at_ms: now,
            updated_at_ms: now,
        };

        match self.repository.create_thread(&thread).await {
            Ok(thread) => Ok(thread),
            Err(DomainError::Conflict) => self
                .repository
                .find_primary_by_participants(&user_a, &user_b)
                .await?
                .ok_or(DomainError::Conflict),
            Err(err) => Err(err),
        }
    }

    /// Creates a dedicated support thread. Never reused: every call inserts
    /// a fresh row even for a pair that already has one.
    pub async fn create_support_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> DomainResult<Thread> {
        let (user_a, user_b) = validate_participant_pair(user_a, user_b)?;
        let now = now_ms();
        let thread = Thread {
            thread_id: crate::util::uuid_v7_without_dashes(),
            user_one_id: user_a,
            user_two_id: user_b,
            is_support_thread: true,
            is_active: true,
            unread_count_user_one: 0,
            unread_count_user_two: 0,
            started_at_ms: now,
            updated_at_ms: now,
        };
        self.repository.create_thread(&thread).await
    }

    pub async fn validate_access(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> DomainResult<Thread> {
        let thread = self
            .repository
            .get_thread(thread_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if !thread.is_participant(user_id) {
            return Err(DomainError::AccessDenied(
                "user is not a participant in this thread".into(),
            ));
        }
        Ok(thread)
    }

    /// Persists a message, bumps the recipient's unread counter, and fans
    /// out `new_message` / `message_sent`. Replays by request id rather
    /// than inserting twice.
    pub async fn record_message(
        &self,
        actor: &ActorIdentity,
        input: SendMessageInput,
    ) -> DomainResult<Message> {
        let thread = self.validate_access(&input.thread_id, &actor.user_id).await?;
        validate_message_context(&thread, input.context)?;

        let body = input.body.trim().to_string();
        validate_message_body(&body)?;

        if let Some(existing) = self
            .repository
            .get_message_by_request_id(&input.thread_id, &input.request_id)
            .await?
        {
            return Ok(existing);
        }

        let recipient = thread
            .counterpart_of(&actor.user_id)
            .map(str::to_string)
            .ok_or_else(|| {
                DomainError::AccessDenied("user is not a participant in this thread".into())
            })?;

        let sent_at_ms = input.occurred_at_ms.unwrap_or_else(now_ms);
        let message = Message {
            message_id: crate::util::uuid_v7_without_dashes(),
            thread_id: input.thread_id,
            sender_id: actor.user_id.clone(),
            body,
            context: input.context,
            kind: input.kind,
            is_read: false,
            sent_at_ms,
            request_id: input.request_id,
            correlation_id: input.correlation_id,
        };

        let message = self.repository.create_message(&message).await?;
        self.repository
            .increment_unread(&message.thread_id, &recipient, message.sent_at_ms)
            .await?;

        if let Ok(item) = serde_json::to_value(&message) {
            let payload = MessageEventPayload {
                thread_id: message.thread_id.clone(),
                item,
            };
            self.publisher
                .publish_to_thread(&message.thread_id, &PushEvent::NewMessage(payload.clone()));
            self.publisher
                .publish_to_user(&recipient, &PushEvent::NewMessage(payload.clone()));
            self.publisher
                .publish_to_user(&actor.user_id, &PushEvent::MessageSent(payload));
        }

        self.submit_notification(
            &recipient,
            "new_message",
            serde_json::json!({
                "thread_id": message.thread_id,
                "message_id": message.message_id,
                "sender_id": message.sender_id,
            }),
            &message.request_id,
            &message.correlation_id,
        )
        .await;

        Ok(message)
    }

    /// Lazily resolves the primary thread for the pair, then records a
    /// direct message in it.
    pub async fn send_direct_message(
        &self,
        actor: &ActorIdentity,
        recipient_id: &str,
        body: String,
        request_id: String,
        correlation_id: String,
    ) -> DomainResult<Message> {
        let thread = self
            .get_or_create_primary(&actor.user_id, recipient_id)
            .await?;
        self.record_message(
            actor,
            SendMessageInput {
                thread_id: thread.thread_id,
                body,
                context: MessageContext::Dm,
                kind: MessageKind::User,
                request_id,
                correlation_id,
                occurred_at_ms: None,
            },
        )
        .await
    }

    /// Flips every unread message not sent by the reader, zeroes the
    /// reader's counter, and emits one receipt per message that actually
    /// changed state. A message landing mid-operation stays unread for the
    /// next call.
    pub async fn mark_read(
        &self,
        actor: &ActorIdentity,
        thread_id: &str,
    ) -> DomainResult<usize> {
        self.validate_access(thread_id, &actor.user_id).await?;
        let flipped = self
            .repository
            .mark_messages_read(thread_id, &actor.user_id)
            .await?;
        self.repository
            .reset_unread(thread_id, &actor.user_id)
            .await?;

        for message in &flipped {
            let event = PushEvent::MessageRead {
                thread_id: thread_id.to_string(),
                message_id: message.message_id.clone(),
                reader_id: actor.user_id.clone(),
            };
            self.publisher.publish_to_thread(thread_id, &event);
            self.publisher.publish_to_user(&message.sender_id, &event);
        }

        Ok(flipped.len())
    }

    /// Single-message variant consumed by the HTTP surface. Flipping an
    /// already-read message is a no-op rather than an error.
    pub async fn mark_message_read(
        &self,
        actor: &ActorIdentity,
        message_id: &str,
    ) -> DomainResult<Message> {
        let message = self
            .repository
            .get_message(message_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.validate_access(&message.thread_id, &actor.user_id)
            .await?;
        if message.sender_id == actor.user_id {
            return Err(DomainError::Validation(
                "cannot mark your own message as read".into(),
            ));
        }
        if message.is_read {
            return Ok(message);
        }

        let message = self.repository.mark_message_read(message_id).await?;
        self.repository
            .decrement_unread(&message.thread_id, &actor.user_id)
            .await?;

        let event = PushEvent::MessageRead {
            thread_id: message.thread_id.clone(),
            message_id: message.message_id.clone(),
            reader_id: actor.user_id.clone(),
        };
        self.publisher.publish_to_thread(&message.thread_id, &event);
        self.publisher.publish_to_user(&message.sender_id, &event);

        Ok(message)
    }

    /// Inbox listing, most recently touched first, with the caller's own
    /// unread counter surfaced per thread.
    pub async fn list_threads(&self, actor: &ActorIdentity) -> DomainResult<Vec<ThreadSummary>> {
        let mut threads = self.repository.list_threads_by_user(&actor.user_id).await?;
        threads.sort_by(|a, b| {
            b.updated_at_ms
                .cmp(&a.updated_at_ms)
                .then_with(|| b.thread_id.cmp(&a.thread_id))
        });
        Ok(threads
            .into_iter()
            .map(|thread| {
                let unread_count = thread.unread_for(&actor.user_id);
                ThreadSummary {
                    thread,
                    unread_count,
                }
            })
            .collect())
    }

    pub(crate) async fn submit_notification(
        &self,
        user_id: &str,
        notification_type: &str,
        payload: serde_json::Value,
        request_id: &str,
        correlation_id: &str,
    ) {
        let Some(queue) = self.notifications.as_ref() else {
            return;
        };
        let job_payload = NotificationJobPayload {
            notification_type: notification_type.to_string(),
            user_id: user_id.to_string(),
            payload,
            request_id: request_id.to_string(),
            correlation_id: correlation_id.to_string(),
        };
        let Ok(payload) = serde_json::to_value(&job_payload) else {
            tracing::error!(notification_type, "failed to serialize notification job");
            return;
        };
        let job = new_job(
            crate::util::uuid_v7_without_dashes(),
            JobType::NotificationDispatch,
            payload,
            request_id.to_string(),
            correlation_id.to_string(),
            JobDefaults::default(),
        );
        if let Err(err) = queue.enqueue(&job).await {
            tracing::warn!(error = %err, notification_type, "notification enqueue failed");
        }
    }
}

fn validate_participant_pair(user_a: &str, user_b: &str) -> DomainResult<(String, String)> {
    let user_a = user_a.trim().to_string();
    let user_b = user_b.trim().to_string();
    if user_a.is_empty() || user_b.is_empty() {
        return Err(DomainError::Validation(
            "both participant ids are required".into(),
        ));
    }
    if user_a == user_b {
        return Err(DomainError::Validation(
            "a thread requires two distinct participants".into(),
        ));
    }
    Ok((user_a, user_b))
}

fn validate_message_body(body: &str) -> DomainResult<()> {
    if body.is_empty() {
        return Err(DomainError::Validation("message body is required".into()));
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(DomainError::Validation(format!(
            "message body exceeds max length of {MAX_BODY_LENGTH}"
        )));
    }
    Ok(())
}

fn validate_message_context(thread: &Thread, context: MessageContext) -> DomainResult<()> {
    match (thread.is_support_thread, context) {
        (true, MessageContext::Support) | (false, MessageContext::Dm) => Ok(()),
        (true, MessageContext::Dm) => Err(DomainError::Validation(
            "direct messages cannot be recorded in a support thread".into(),
        )),
        (false, MessageContext::Support) => Err(DomainError::Validation(
            "support messages belong in a support thread".into(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ports::BoxFuture;
    use crate::realtime::PushEvent;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::RwLock;

    /// Captures pushes so tests can assert room targeting.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub user_events: Mutex<Vec<(String, PushEvent)>>,
        pub thread_events: Mutex<Vec<(String, PushEvent)>>,
    }

    impl RecordingPublisher {
        pub fn user_events_named(&self, name: &str) -> Vec<(String, PushEvent)> {
            self.user_events
                .lock()
                .expect("publisher lock")
                .iter()
                .filter(|(_, event)| event.name() == name)
                .cloned()
                .collect()
        }

        pub fn thread_events_named(&self, name: &str) -> Vec<(String, PushEvent)> {
            self.thread_events
                .lock()
                .expect("publisher lock")
                .iter()
                .filter(|(_, event)| event.name() == name)
                .cloned()
                .collect()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish_to_user(&self, user_id: &str, event: &PushEvent) {
            self.user_events
                .lock()
                .expect("publisher lock")
                .push((user_id.to_string(), event.clone()));
        }

        fn publish_to_thread(&self, thread_id: &str, event: &PushEvent) {
            self.thread_events
                .lock()
                .expect("publisher lock")
                .push((thread_id.to_string(), event.clone()));
        }
    }

    #[derive(Default)]
    pub struct MockThreadRepo {
        pub threads: RwLock<HashMap<String, Thread>>,
        pub primary_pairs: RwLock<HashMap<String, String>>,
        pub messages: RwLock<HashMap<String, Message>>,
        pub by_request: RwLock<HashMap<(String, String), String>>,
    }

    impl MockThreadRepo {
        fn sorted_messages(messages: Vec<Message>) -> Vec<Message> {
            let mut messages = messages;
            messages.sort_by(|a, b| {
                a.sent_at_ms
                    .cmp(&b.sent_at_ms)
                    .then_with(|| a.message_id.cmp(&b.message_id))
            });
            messages
        }
    }

    impl ThreadRepository for MockThreadRepo {
        fn create_thread(&self, thread: &Thread) -> BoxFuture<'_, DomainResult<Thread>> {
            let thread = thread.clone();
            Box::pin(async move {
                if !thread.is_support_thread {
                    let pair_key = crate::util::participant_pair_key(
                        &thread.user_one_id,
                        &thread.user_two_id,
                    );
                    let mut pairs = self.primary_pairs.write().await;
                    if pairs.contains_key(&pair_key) {
                        return Err(DomainError::Conflict);
                    }
                    pairs.insert(pair_key, thread.thread_id.clone());
                }
                let mut threads = self.threads.write().await;
                if threads.contains_key(&thread.thread_id) {
                    return Err(DomainError::Conflict);
                }
                threads.insert(thread.thread_id.clone(), thread.clone());
                Ok(thread)
            })
        }

        fn get_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
            let thread_id = thread_id.to_string();
            Box::pin(async move { Ok(self.threads.read().await.get(&thread_id).cloned()) })
        }

        fn find_primary_by_participants(
            &self,
            user_a: &str,
            user_b: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
            let pair_key = crate::util::participant_pair_key(user_a, user_b);
            Box::pin(async move {
                let pairs = self.primary_pairs.read().await;
                let Some(thread_id) = pairs.get(&pair_key) else {
                    return Ok(None);
                };
                Ok(self.threads.read().await.get(thread_id).cloned())
            })
        }

        fn list_threads_by_user(
            &self,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<Thread>>> {
            let user_id = user_id.to_string();
            Box::pin(async move {
                Ok(self
                    .threads
                    .read()
                    .await
                    .values()
                    .filter(|thread| thread.is_participant(&user_id))
                    .cloned()
                    .collect())
            })
        }

        fn increment_unread(
            &self,
            thread_id: &str,
            user_id: &str,
            occurred_at_ms: i64,
        ) -> BoxFuture<'_, DomainResult<Thread>> {
            let thread_id = thread_id.to_string();
            let user_id = user_id.to_string();
            Box::pin(async move {
                let mut threads = self.threads.write().await;
                let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
                if thread.user_one_id == user_id {
                    thread.unread_count_user_one += 1;
                } else if thread.user_two_id == user_id {
                    thread.unread_count_user_two += 1;
                } else {
                    return Err(DomainError::NotFound);
                }
                thread.updated_at_ms = thread.updated_at_ms.max(occurred_at_ms);
                Ok(thread.clone())
            })
        }

        fn decrement_unread(
            &self,
            thread_id: &str,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Thread>> {
            let thread_id = thread_id.to_string();
            let user_id = user_id.to_string();
            Box::pin(async move {
                let mut threads = self.threads.write().await;
                let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
                if thread.user_one_id == user_id {
                    thread.unread_count_user_one = thread.unread_count_user_one.saturating_sub(1);
                } else if thread.user_two_id == user_id {
                    thread.unread_count_user_two = thread.unread_count_user_two.saturating_sub(1);
                }
                Ok(thread.clone())
            })
        }

        fn reset_unread(
            &self,
            thread_id: &str,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Thread>> {
            let thread_id = thread_id.to_string();
            let user_id = user_id.to_string();
            Box::pin(async move {
                let mut threads = self.threads.write().await;
                let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
                if thread.user_one_id == user_id {
                    thread.unread_count_user_one = 0;
                } else if thread.user_two_id == user_id {
                    thread.unread_count_user_two = 0;
                }
                Ok(thread.clone())
            })
        }

        fn set_active(
            &self,
            thread_id: &str,
            is_active: bool,
        ) -> BoxFuture<'_, DomainResult<Thread>> {
            let thread_id = thread_id.to_string();
            Box::pin(async move {
                let mut threads = self.threads.write().await;
                let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
                thread.is_active = is_active;
                Ok(thread.clone())
            })
        }

        fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
            let message = message.clone();
            Box::pin(async move {
                let request_key = (message.thread_id.clone(), message.request_id.clone());
                let mut by_request = self.by_request.write().await;
                if let Some(existing_id) = by_request.get(&request_key) {
                    let messages = self.messages.read().await;
                    if let Some(existing) = messages.get(existing_id) {
                        return Ok(existing.clone());
                    }
                    by_request.remove(&request_key);
                }
                let mut messages = self.messages.write().await;
                if messages.contains_key(&message.message_id) {
                    return Err(DomainError::Conflict);
                }
                messages.insert(message.message_id.clone(), message.clone());
                by_request.insert(request_key, message.message_id.clone());
                Ok(message)
            })
        }

        fn get_message(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
            let message_id = message_id.to_string();
            Box::pin(async move { Ok(self.messages.read().await.get(&message_id).cloned()) })
        }

        fn get_message_by_request_id(
            &self,
            thread_id: &str,
            request_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
            let request_key = (thread_id.to_string(), request_id.to_string());
            Box::pin(async move {
                let by_request = self.by_request.read().await;
                let Some(message_id) = by_request.get(&request_key) else {
                    return Ok(None);
                };
                Ok(self.messages.read().await.get(message_id).cloned())
            })
        }

        fn list_messages(
            &self,
            thread_id: &str,
            contexts: &[MessageContext],
        ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
            let thread_id = thread_id.to_string();
            let contexts = contexts.to_vec();
            Box::pin(async move {
                let messages: Vec<_> = self
                    .messages
                    .read()
                    .await
                    .values()
                    .filter(|message| {
                        message.thread_id == thread_id && contexts.contains(&message.context)
                    })
                    .cloned()
                    .collect();
                Ok(Self::sorted_messages(messages))
            })
        }

        fn mark_messages_read(
            &self,
            thread_id: &str,
            reader_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
            let thread_id = thread_id.to_string();
            let reader_id = reader_id.to_string();
            Box::pin(async move {
                let mut messages = self.messages.write().await;
                let mut flipped = Vec::new();
                for message in messages.values_mut() {
                    if message.thread_id == thread_id
                        && message.sender_id != reader_id
                        && !message.is_read
                    {
                        message.is_read = true;
                        flipped.push(message.clone());
                    }
                }
                Ok(Self::sorted_messages(flipped))
            })
        }

        fn mark_message_read(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Message>> {
            let message_id = message_id.to_string();
            Box::pin(async move {
                let mut messages = self.messages.write().await;
                let message = messages.get_mut(&message_id).ok_or(DomainError::NotFound)?;
                message.is_read = true;
                Ok(message.clone())
            })
        }
    }
}
