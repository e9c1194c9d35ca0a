use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::jobs::now_ms;
use crate::ports::tips::TipRepository;
use crate::realtime::{MessageEventPayload, PushEvent};
use crate::threads::{MessageContext, MessageKind, SendMessageInput, ThreadService};

const MAX_REASON_LENGTH: usize = 280;
const MAX_TIP_AMOUNT: i64 = 100_000;

/// Immutable token transfer. Carries no thread reference; timelines look it
/// up by the participant pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTransfer {
    pub transfer_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: i64,
    pub reason: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct SendTipInput {
    pub to_user_id: String,
    pub amount: i64,
    pub reason: Option<String>,
    /// Optional courtesy line shown to the recipient. Stored as a
    /// `tip_notice` message so the timeline can drop it instead of showing
    /// the tip twice.
    pub courtesy_message: Option<String>,
    pub request_id: String,
    pub correlation_id: String,
}

#[derive(Clone)]
pub struct TipService {
    repository: Arc<dyn TipRepository>,
    threads: ThreadService,
}

impl TipService {
    pub fn new(repository: Arc<dyn TipRepository>, threads: ThreadService) -> Self {
        Self {
            repository,
            threads,
        }
    }

    pub async fn send_tip(
        &self,
        actor: &ActorIdentity,
        input: SendTipInput,
    ) -> DomainResult<TokenTransfer> {
        let input = validate_tip_input(actor, input)?;

        // The transfer renders into the primary thread's timeline, so make
        // sure that thread exists even on first contact.
        let thread = self
            .threads
            .get_or_create_primary(&actor.user_id, &input.to_user_id)
            .await?;

        let transfer = TokenTransfer {
            transfer_id: crate::util::uuid_v7_without_dashes(),
            from_user_id: actor.user_id.clone(),
            to_user_id: input.to_user_id.clone(),
            amount: input.amount,
            reason: input.reason.clone(),
            created_at_ms: now_ms(),
        };
        let transfer = self.repository.create_transfer(&transfer).await?;

        if let Some(body) = input.courtesy_message {
            self.threads
                .record_message(
                    actor,
                    SendMessageInput {
                        thread_id: thread.thread_id.clone(),
                        body,
                        context: MessageContext::Dm,
                        kind: MessageKind::TipNotice,
                        request_id: format!("tip:{}", transfer.transfer_id),
                        correlation_id: input.correlation_id.clone(),
                        occurred_at_ms: Some(transfer.created_at_ms),
                    },
                )
                .await?;
        }

        if let Ok(item) = serde_json::to_value(&transfer) {
            let payload = MessageEventPayload {
                thread_id: thread.thread_id.clone(),
                item,
            };
            self.threads
                .publisher()
                .publish_to_thread(&thread.thread_id, &PushEvent::NewMessage(payload.clone()));
            self.threads
                .publisher()
                .publish_to_user(&transfer.to_user_id, &PushEvent::NewMessage(payload.clone()));
            self.threads
                .publisher()
                .publish_to_user(&actor.user_id, &PushEvent::MessageSent(payload));
        }

        self.threads
            .submit_notification(
                &transfer.to_user_id,
                "tip_received",
                serde_json::json!({
                    "transfer_id": transfer.transfer_id,
                    "from_user_id": transfer.from_user_id,
                    "amount": transfer.amount,
                }),
                &input.request_id,
                &input.correlation_id,
            )
            .await;

        Ok(transfer)
    }

    pub async fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> DomainResult<Vec<TokenTransfer>> {
        self.repository.list_between(user_a, user_b).await
    }

    pub async fn sum_between(&self, from_user_id: &str, to_user_id: &str) -> DomainResult<i64> {
        self.repository.sum_between(from_user_id, to_user_id).await
    }
}

fn validate_tip_input(actor: &ActorIdentity, mut input: SendTipInput) -> DomainResult<SendTipInput> {
    input.to_user_id = input.to_user_id.trim().to_string();
    if input.to_user_id.is_empty() {
        return Err(DomainError::Validation("to_user_id is required".into()));
    }
    if input.to_user_id == actor.user_id {
        return Err(DomainError::Validation("cannot tip yourself".into()));
    }
    if input.amount <= 0 {
        return Err(DomainError::Validation("tip amount must be positive".into()));
    }
    if input.amount > MAX_TIP_AMOUNT {
        return Err(DomainError::Validation(format!(
            "tip amount exceeds max of {MAX_TIP_AMOUNT}"
        )));
    }
    if let Some(reason) = input.reason.as_mut() {
        *reason = reason.trim().to_string();
        if reason.is_empty() {
            input.reason = None;
        } else if reason.chars().count() > MAX_REASON_LENGTH {
            return Err(DomainError::Validation(format!(
                "reason exceeds max length of {MAX_REASON_LENGTH}"
            )));
        }
    }
    if let Some(courtesy) = input.courtesy_message.as_mut() {
        *courtesy = courtesy.trim().to_string();
        if courtesy.is_empty() {
            input.courtesy_message = None;
        }
    }
    Ok(input)
}


#[cfg(test)]
mod tests {
    use super::testing::MockTipRepo;
    use super::*;
    use crate::threads::testing::{MockThreadRepo, RecordingPublisher};

    fn tip_service(
        tips: Arc<MockTipRepo>,
        threads: Arc<MockThreadRepo>,
        publisher: Arc<RecordingPublisher>,
    ) -> TipService {
        TipService::new(tips, ThreadService::new(threads, publisher, None))
    }

    fn actor(user_id: &str) -> ActorIdentity {
        ActorIdentity::with_user_id(user_id)
    }

    #[tokio::test]
    async fn tip_records_transfer_and_tags_courtesy_message() {
        let tips = Arc::new(MockTipRepo::default());
        let threads = Arc::new(MockThreadRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = tip_service(tips.clone(), threads.clone(), publisher.clone());

        let transfer = service
            .send_tip(
                &actor("alice"),
                SendTipInput {
                    to_user_id: "bob".to_string(),
                    amount: 100,
                    reason: Some("thanks".to_string()),
                    courtesy_message: Some("thanks".to_string()),
                    request_id: "req-1".to_string(),
                    correlation_id: "corr-1".to_string(),
                },
            )
            .await
            .expect("tip");

        assert_eq!(transfer.amount, 100);
        assert_eq!(tips.transfers.read().await.len(), 1);

        let messages = threads.messages.read().await;
        assert_eq!(messages.len(), 1);
        let courtesy = messages.values().next().expect("courtesy row");
        assert_eq!(courtesy.kind, MessageKind::TipNotice);
        assert_eq!(courtesy.context, MessageContext::Dm);

        // Recipient sees two pushes: the courtesy message and the transfer.
        assert_eq!(publisher.user_events_named("new_message").len(), 2);
    }

    #[tokio::test]
    async fn tip_sum_is_directional() {
        let tips = Arc::new(MockTipRepo::default());
        let threads = Arc::new(MockThreadRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = tip_service(tips, threads, publisher);

        for (from, to, amount, req) in [
            ("alice", "bob", 50, "req-1"),
            ("alice", "bob", 25, "req-2"),
            ("bob", "alice", 10, "req-3"),
        ] {
            service
                .send_tip(
                    &actor(from),
                    SendTipInput {
                        to_user_id: to.to_string(),
                        amount,
                        reason: None,
                        courtesy_message: None,
                        request_id: req.to_string(),
                        correlation_id: "corr".to_string(),
                    },
                )
                .await
                .expect("tip");
        }

        assert_eq!(service.sum_between("alice", "bob").await.expect("sum"), 75);
        assert_eq!(service.sum_between("bob", "alice").await.expect("sum"), 10);
        assert_eq!(service.list_between("alice", "bob").await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn tip_validation_rejects_bad_input() {
        let tips = Arc::new(MockTipRepo::default());
        let threads = Arc::new(MockThreadRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = tip_service(tips, threads, publisher);

        let zero = service
            .send_tip(
                &actor("alice"),
                SendTipInput {
                    to_user_id: "bob".to_string(),
                    amount: 0,
                    reason: None,
                    courtesy_message: None,
                    request_id: "req-1".to_string(),
                    correlation_id: "corr".to_string(),
                },
            )
            .await;
        assert!(matches!(zero, Err(DomainError::Validation(_))));

        let self_tip = service
            .send_tip(
                &actor("alice"),
                SendTipInput {
                    to_user_id: "alice".to_string(),
                    amount: 10,
                    reason: None,
                    courtesy_message: None,
                    request_id: "req-2".to_string(),
                    correlation_id: "corr".to_string(),
                },
            )
            .await;
        assert!(matches!(self_tip, Err(DomainError::Validation(_))));
    }
}
