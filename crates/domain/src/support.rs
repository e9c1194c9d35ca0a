use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::jobs::now_ms;
use crate::ports::support::SupportRequestRepository;
use crate::realtime::{PushEvent, SupportEventPayload};
use crate::threads::ThreadService;

/// Grace period before a one-sided close is force-completed.
pub const AUTO_COMPLETE_GRACE_MS: i64 = 24 * 60 * 60 * 1_000;
/// Neutral rating recorded for the side that never closed.
pub const AUTO_COMPLETE_DEFAULT_RATING: u8 = 3;

const MAX_DESCRIPTION_LENGTH: usize = 1_000;
const MAX_KIND_LENGTH: usize = 64;
const MAX_AMOUNT: i64 = 100_000;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    Pending,
    Accepted,
    Declined,
    Canceled,
    AwaitingCompletion,
    Completed,
    Reported,
}

impl SupportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupportStatus::Declined
                | SupportStatus::Canceled
                | SupportStatus::Completed
                | SupportStatus::Reported
        )
    }

    pub fn is_closable(&self) -> bool {
        matches!(self, SupportStatus::Accepted | SupportStatus::AwaitingCompletion)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportRequest {
    pub request_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: SupportStatus,
    pub kind: String,
    pub amount: i64,
    /// Requests without a description are internal plumbing and never
    /// surface in timelines.
    pub description: Option<String>,
    /// Null until accepted; then points at the dedicated support thread.
    pub thread_id: Option<String>,
    pub from_user_rating: Option<u8>,
    pub to_user_rating: Option<u8>,
    pub closed_by_from_user_at_ms: Option<i64>,
    pub closed_by_to_user_at_ms: Option<i64>,
    pub sent_at_ms: i64,
    pub responded_at_ms: Option<i64>,
}

impl SupportRequest {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.from_user_id == user_id || self.to_user_id == user_id
    }

    pub fn close_slot(&self, user_id: &str) -> Option<i64> {
        if self.from_user_id == user_id {
            self.closed_by_from_user_at_ms
        } else if self.to_user_id == user_id {
            self.closed_by_to_user_at_ms
        } else {
            None
        }
    }

    pub fn both_closed(&self) -> bool {
        self.closed_by_from_user_at_ms.is_some() && self.closed_by_to_user_at_ms.is_some()
    }

    /// The participant that has not closed yet, when exactly one side has.
    pub fn silent_side(&self) -> Option<&str> {
        match (
            self.closed_by_from_user_at_ms,
            self.closed_by_to_user_at_ms,
        ) {
            (Some(_), None) => Some(&self.to_user_id),
            (None, Some(_)) => Some(&self.from_user_id),
            _ => None,
        }
    }

    /// Timestamp of the single recorded close, when exactly one side has
    /// closed.
    pub fn one_sided_close_at(&self) -> Option<i64> {
        match (
            self.closed_by_from_user_at_ms,
            self.closed_by_to_user_at_ms,
        ) {
            (Some(at), None) | (None, Some(at)) => Some(at),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportReport {
    pub report_id: String,
    pub request_id: String,
    pub reporter_id: String,
    pub category: String,
    pub description: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct CreateSupportRequestInput {
    pub to_user_id: String,
    pub kind: String,
    pub amount: i64,
    pub description: String,
    pub request_id: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct ReportSupportRequestInput {
    pub category: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantRole {
    Sent,
    Received,
}

#[derive(Clone)]
pub struct SupportService {
    repository: Arc<dyn SupportRequestRepository>,
    threads: ThreadService,
}

impl SupportService {
    pub fn new(repository: Arc<dyn SupportRequestRepository>, threads: ThreadService) -> Self {
        Self {
            repository,
            threads,
        }
    }

    /// Submits a new request. The primary thread between the pair is
    /// created first so the request is visible in the ordinary inbox.
    pub async fn create(
        &self,
        actor: &ActorIdentity,
        input: CreateSupportRequestInput,
    ) -> DomainResult<SupportRequest> {
        let input = validate_create_input(actor, input)?;
        let thread = self
            .threads
            .get_or_create_primary(&actor.user_id, &input.to_user_id)
            .await?;

        let request = SupportRequest {
            request_id: crate::util::uuid_v7_without_dashes(),
            from_user_id: actor.user_id.clone(),
            to_user_id: input.to_user_id.clone(),
            status: SupportStatus::Pending,
            kind: input.kind,
            amount: input.amount,
            description: Some(input.description),
            thread_id: None,
            from_user_rating: None,
            to_user_rating: None,
            closed_by_from_user_at_ms: None,
            closed_by_to_user_at_ms: None,
            sent_at_ms: now_ms(),
            responded_at_ms: None,
        };
        let request = self.repository.create_request(&request).await?;

        let event = PushEvent::SupportRequestCreated(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.to_user_id, &event);
        self.threads
            .publisher()
            .publish_to_thread(&thread.thread_id, &event);

        self.threads
            .submit_notification(
                &request.to_user_id,
                "support_request_created",
                serde_json::json!({
                    "request_id": request.request_id,
                    "from_user_id": request.from_user_id,
                    "kind": request.kind,
                    "amount": request.amount,
                }),
                &input.request_id,
                &input.correlation_id,
            )
            .await;

        Ok(request)
    }

    /// Accepts a pending request: a brand-new support thread is created per
    /// acceptance, never reused across requests.
    pub async fn accept(
        &self,
        actor: &ActorIdentity,
        request_id: &str,
    ) -> DomainResult<SupportRequest> {
        let request = self.get(request_id).await?;
        if request.to_user_id != actor.user_id {
            return Err(DomainError::AccessDenied(
                "only the recipient can accept this request".into(),
            ));
        }
        if request.status != SupportStatus::Pending {
            return Err(DomainError::InvalidState(
                "only a pending request can be accepted".into(),
            ));
        }

        let support_thread = self
            .threads
            .create_support_thread(&request.from_user_id, &request.to_user_id)
            .await?;
        let request = self
            .repository
            .accept_request(request_id, &support_thread.thread_id, now_ms())
            .await?;

        let event = PushEvent::SupportRequestAccepted(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.from_user_id, &event);
        self.threads
            .publisher()
            .publish_to_user(&request.to_user_id, &event);

        self.threads
            .submit_notification(
                &request.from_user_id,
                "support_request_accepted",
                serde_json::json!({
                    "request_id": request.request_id,
                    "thread_id": request.thread_id,
                }),
                &request.request_id,
                &request.request_id,
            )
            .await;

        Ok(request)
    }

    pub async fn decline(
        &self,
        actor: &ActorIdentity,
        request_id: &str,
    ) -> DomainResult<SupportRequest> {
        let request = self.get(request_id).await?;
        if request.to_user_id != actor.user_id {
            return Err(DomainError::AccessDenied(
                "only the recipient can decline this request".into(),
            ));
        }
        if request.status != SupportStatus::Pending {
            return Err(DomainError::InvalidState(
                "only a pending request can be declined".into(),
            ));
        }
        let request = self
            .repository
            .set_status(
                request_id,
                &[SupportStatus::Pending],
                SupportStatus::Declined,
                Some(now_ms()),
                false,
            )
            .await?;

        let event = PushEvent::SupportRequestRejected(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.from_user_id, &event);

        self.threads
            .submit_notification(
                &request.from_user_id,
                "support_request_declined",
                serde_json::json!({ "request_id": request.request_id }),
                &request.request_id,
                &request.request_id,
            )
            .await;

        Ok(request)
    }

    pub async fn cancel(
        &self,
        actor: &ActorIdentity,
        request_id: &str,
    ) -> DomainResult<SupportRequest> {
        let request = self.get(request_id).await?;
        if request.from_user_id != actor.user_id {
            return Err(DomainError::AccessDenied(
                "only the requester can cancel this request".into(),
            ));
        }
        if request.status != SupportStatus::Pending {
            return Err(DomainError::InvalidState(
                "only a pending request can be canceled".into(),
            ));
        }
        let request = self
            .repository
            .set_status(
                request_id,
                &[SupportStatus::Pending],
                SupportStatus::Canceled,
                None,
                true,
            )
            .await?;

        let event = PushEvent::SupportRequestCancelled(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.to_user_id, &event);

        Ok(request)
    }

    /// Records one side's close with its rating. Both slots set (by either
    /// order of arrival) completes the request; a repeat close by the same
    /// participant is an explicit error, not a no-op.
    pub async fn close(
        &self,
        actor: &ActorIdentity,
        request_id: &str,
        rating: u8,
    ) -> DomainResult<SupportRequest> {
        let request = self.get(request_id).await?;
        if !request.is_participant(&actor.user_id) {
            return Err(DomainError::AccessDenied(
                "only a participant can close this request".into(),
            ));
        }
        if !request.status.is_closable() {
            return Err(DomainError::InvalidState(
                "only an accepted request can be closed".into(),
            ));
        }
        if request.close_slot(&actor.user_id).is_some() {
            return Err(DomainError::AlreadyDone(
                "request already closed by this user".into(),
            ));
        }
        validate_rating(rating)?;

        let request = self
            .repository
            .record_close(request_id, &actor.user_id, rating, now_ms())
            .await?;

        if request.status == SupportStatus::Completed {
            if let Some(thread_id) = request.thread_id.as_deref() {
                self.threads.repository().set_active(thread_id, false).await?;
            }
        }

        let event = PushEvent::SupportRequestClosed(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.from_user_id, &event);
        self.threads
            .publisher()
            .publish_to_user(&request.to_user_id, &event);

        Ok(request)
    }

    /// Files a report and freezes the request. One report per participant
    /// per request.
    pub async fn report(
        &self,
        actor: &ActorIdentity,
        request_id: &str,
        input: ReportSupportRequestInput,
    ) -> DomainResult<SupportReport> {
        let request = self.get(request_id).await?;
        if !request.is_participant(&actor.user_id) {
            return Err(DomainError::AccessDenied(
                "only a participant can report this request".into(),
            ));
        }
        if !request.status.is_closable() {
            return Err(DomainError::InvalidState(
                "only an active request can be reported".into(),
            ));
        }
        let input = validate_report_input(input)?;
        if self
            .repository
            .find_report(request_id, &actor.user_id)
            .await?
            .is_some()
        {
            return Err(DomainError::AlreadyDone(
                "you already reported this request".into(),
            ));
        }

        let report = SupportReport {
            report_id: crate::util::uuid_v7_without_dashes(),
            request_id: request_id.to_string(),
            reporter_id: actor.user_id.clone(),
            category: input.category,
            description: input.description,
            created_at_ms: now_ms(),
        };
        let report = self.repository.create_report(&report).await?;

        let request = self
            .repository
            .set_status(
                request_id,
                &[SupportStatus::Accepted, SupportStatus::AwaitingCompletion],
                SupportStatus::Reported,
                None,
                false,
            )
            .await?;

        let event = PushEvent::SupportRequestReported(event_payload(&request));
        self.threads
            .publisher()
            .publish_to_user(&request.from_user_id, &event);
        self.threads
            .publisher()
            .publish_to_user(&request.to_user_id, &event);

        Ok(report)
    }

    pub async fn get(&self, request_id: &str) -> DomainResult<SupportRequest> {
        self.repository
            .get_request(request_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_for(
        &self,
        actor: &ActorIdentity,
        role: Option<ParticipantRole>,
    ) -> DomainResult<Vec<SupportRequest>> {
        let requests = self.repository.list_by_participant(&actor.user_id).await?;
        Ok(requests
            .into_iter()
            .filter(|request| match role {
                Some(ParticipantRole::Sent) => request.from_user_id == actor.user_id,
                Some(ParticipantRole::Received) => request.to_user_id == actor.user_id,
                None => true,
            })
            .collect())
    }

    /// Force-completes requests stuck waiting on a silent counterpart. For
    /// every AWAITING_COMPLETION request whose single close is at least the
    /// grace period old, the other side is closed with the neutral rating.
    /// Returns how many requests were completed.
    pub async fn auto_complete_sweep(&self, now_ms: i64) -> DomainResult<usize> {
        let candidates = self.repository.list_awaiting_completion().await?;
        let mut completed = 0usize;
        for request in candidates {
            let Some(silent) = request.silent_side().map(str::to_string) else {
                continue;
            };
            let Some(closed_at) = request.one_sided_close_at() else {
                continue;
            };
            if now_ms - closed_at < AUTO_COMPLETE_GRACE_MS {
                continue;
            }

            let request = match self
                .repository
                .record_close(
                    &request.request_id,
                    &silent,
                    AUTO_COMPLETE_DEFAULT_RATING,
                    now_ms,
                )
                .await
            {
                Ok(request) => request,
                // Lost a race with a real close or report; nothing to force.
                Err(DomainError::AlreadyDone(_)) | Err(DomainError::InvalidState(_)) => continue,
                Err(err) => return Err(err),
            };

            if request.status == SupportStatus::Completed {
                if let Some(thread_id) = request.thread_id.as_deref() {
                    self.threads.repository().set_active(thread_id, false).await?;
                }
                let event = PushEvent::SupportRequestClosed(event_payload(&request));
                self.threads
                    .publisher()
                    .publish_to_user(&request.from_user_id, &event);
                self.threads
                    .publisher()
                    .publish_to_user(&request.to_user_id, &event);
                completed += 1;
                tracing::info!(
                    request_id = %request.request_id,
                    "auto-completed one-sided close"
                );
            }
        }
        Ok(completed)
    }
}

fn event_payload(request: &SupportRequest) -> SupportEventPayload {
    SupportEventPayload {
        request_id: request.request_id.clone(),
        from_user_id: request.from_user_id.clone(),
        to_user_id: request.to_user_id.clone(),
        status: request.status,
        thread_id: request.thread_id.clone(),
    }
}

fn validate_create_input(
    actor: &ActorIdentity,
    mut input: CreateSupportRequestInput,
) -> DomainResult<CreateSupportRequestInput> {
    input.to_user_id = input.to_user_id.trim().to_string();
    input.kind = input.kind.trim().to_string();
    input.description = input.description.trim().to_string();

    if input.to_user_id.is_empty() {
        return Err(DomainError::Validation("to_user_id is required".into()));
    }
    if input.to_user_id == actor.user_id {
        return Err(DomainError::Validation(
            "cannot send a support request to yourself".into(),
        ));
    }
    if input.kind.is_empty() || input.kind.chars().count() > MAX_KIND_LENGTH {
        return Err(DomainError::Validation(
            "request type must be 1-64 characters".into(),
        ));
    }
    if input.description.is_empty() {
        return Err(DomainError::Validation("description is required".into()));
    }
    if input.description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(DomainError::Validation(format!(
            "description exceeds max length of {MAX_DESCRIPTION_LENGTH}"
        )));
    }
    if input.amount < 0 || input.amount > MAX_AMOUNT {
        return Err(DomainError::Validation(format!(
            "amount must be between 0 and {MAX_AMOUNT}"
        )));
    }
    Ok(input)
}

fn validate_rating(rating: u8) -> DomainResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(DomainError::Validation(
            "rating must be between 1 and 5".into(),
        ));
    }
    Ok(())
}

fn validate_report_input(
    mut input: ReportSupportRequestInput,
) -> DomainResult<ReportSupportRequestInput> {
    input.category = input.category.trim().to_string();
    input.description = input.description.trim().to_string();
    if input.category.is_empty() {
        return Err(DomainError::Validation("report category is required".into()));
    }
    if input.description.is_empty() {
        return Err(DomainError::Validation(
            "report description is required".into(),
        ));
    }
    Ok(input)
}


#[cfg(test)]
mod tests {
    use super::testing::MockSupportRepo;
    use super::*;
    use crate::threads::testing::{MockThreadRepo, RecordingPublisher};

    struct Fixture {
        service: SupportService,
        support_repo: Arc<MockSupportRepo>,
        thread_repo: Arc<MockThreadRepo>,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let support_repo = Arc::new(MockSupportRepo::default());
        let thread_repo = Arc::new(MockThreadRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let threads = ThreadService::new(thread_repo.clone(), publisher.clone(), None);
        Fixture {
            service: SupportService::new(support_repo.clone(), threads),
            support_repo,
            thread_repo,
            publisher,
        }
    }

    fn actor(user_id: &str) -> ActorIdentity {
        ActorIdentity::with_user_id(user_id)
    }

    fn create_input(to: &str) -> CreateSupportRequestInput {
        CreateSupportRequestInput {
            to_user_id: to.to_string(),
            kind: "GENERAL".to_string(),
            amount: 50,
            description: "need help".to_string(),
            request_id: "req-1".to_string(),
            correlation_id: "corr-1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_is_pending_and_announced_to_responder() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");

        assert_eq!(request.status, SupportStatus::Pending);
        assert!(request.thread_id.is_none());
        // The primary thread is materialized so the request shows up in the
        // ordinary inbox.
        assert_eq!(fx.thread_repo.threads.read().await.len(), 1);

        let created = fx.publisher.user_events_named("support_request_created");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "bob");
        assert_eq!(
            fx.publisher
                .thread_events_named("support_request_created")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn accept_creates_fresh_support_thread_each_time() {
        let fx = fixture();
        let first = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");
        let first = fx
            .service
            .accept(&actor("bob"), &first.request_id)
            .await
            .expect("accept");

        let mut second_input = create_input("bob");
        second_input.request_id = "req-2".to_string();
        let second = fx
            .service
            .create(&actor("alice"), second_input)
            .await
            .expect("create again");
        let second = fx
            .service
            .accept(&actor("bob"), &second.request_id)
            .await
            .expect("accept again");

        let first_thread = first.thread_id.expect("first thread id");
        let second_thread = second.thread_id.expect("second thread id");
        assert_ne!(first_thread, second_thread);
        assert_eq!(first.status, SupportStatus::Accepted);
        assert!(first.responded_at_ms.is_some());

        let threads = fx.thread_repo.threads.read().await;
        assert!(threads.get(&first_thread).expect("thread").is_support_thread);
    }

    #[tokio::test]
    async fn accept_is_gated_by_role_and_state() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");

        let by_requester = fx.service.accept(&actor("alice"), &request.request_id).await;
        assert!(matches!(by_requester, Err(DomainError::AccessDenied(_))));

        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");
        let again = fx.service.accept(&actor("bob"), &request.request_id).await;
        assert!(matches!(again, Err(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn decline_and_cancel_only_from_pending() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");

        let cancel_by_responder = fx.service.cancel(&actor("bob"), &request.request_id).await;
        assert!(matches!(
            cancel_by_responder,
            Err(DomainError::AccessDenied(_))
        ));

        let declined = fx
            .service
            .decline(&actor("bob"), &request.request_id)
            .await
            .expect("decline");
        assert_eq!(declined.status, SupportStatus::Declined);

        let cancel_after = fx.service.cancel(&actor("alice"), &request.request_id).await;
        assert!(matches!(cancel_after, Err(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn two_sided_close_completes_in_either_order() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");
        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");

        let after_first = fx
            .service
            .close(&actor("bob"), &request.request_id, 5)
            .await
            .expect("first close");
        assert_eq!(after_first.status, SupportStatus::AwaitingCompletion);

        let after_second = fx
            .service
            .close(&actor("alice"), &request.request_id, 4)
            .await
            .expect("second close");
        assert_eq!(after_second.status, SupportStatus::Completed);
        assert_eq!(after_second.from_user_rating, Some(4));
        assert_eq!(after_second.to_user_rating, Some(5));

        // The dedicated support thread is retired on completion.
        let thread_id = after_second.thread_id.expect("thread id");
        assert!(!fx
            .thread_repo
            .threads
            .read()
            .await
            .get(&thread_id)
            .expect("thread")
            .is_active);
    }

    #[tokio::test]
    async fn double_close_by_same_user_is_already_done() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");
        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");
        fx.service
            .close(&actor("bob"), &request.request_id, 5)
            .await
            .expect("close");

        let repeat = fx.service.close(&actor("bob"), &request.request_id, 1).await;
        assert!(matches!(repeat, Err(DomainError::AlreadyDone(_))));

        let stored = fx
            .service
            .get(&request.request_id)
            .await
            .expect("request");
        assert_eq!(stored.to_user_rating, Some(5));
        assert_eq!(stored.status, SupportStatus::AwaitingCompletion);
    }

    #[tokio::test]
    async fn close_rejects_pending_and_bad_rating() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");

        let pending_close = fx.service.close(&actor("alice"), &request.request_id, 3).await;
        assert!(matches!(pending_close, Err(DomainError::InvalidState(_))));

        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");
        let bad_rating = fx.service.close(&actor("alice"), &request.request_id, 6).await;
        assert!(matches!(bad_rating, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn report_freezes_request_once_per_reporter() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");
        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");

        let report_input = ReportSupportRequestInput {
            category: "abuse".to_string(),
            description: "spam in support chat".to_string(),
        };
        fx.service
            .report(&actor("alice"), &request.request_id, report_input.clone())
            .await
            .expect("report");

        let stored = fx.service.get(&request.request_id).await.expect("request");
        assert_eq!(stored.status, SupportStatus::Reported);

        let repeat = fx
            .service
            .report(&actor("alice"), &request.request_id, report_input)
            .await;
        assert!(matches!(repeat, Err(DomainError::AlreadyDone(_))));
        assert_eq!(fx.support_repo.reports.read().await.len(), 1);
    }

    #[tokio::test]
    async fn sweep_force_completes_stale_one_sided_closes() {
        let fx = fixture();
        let request = fx
            .service
            .create(&actor("alice"), create_input("bob"))
            .await
            .expect("create");
        fx.service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");
        fx.service
            .close(&actor("bob"), &request.request_id, 5)
            .await
            .expect("close");

        let closed_at = fx
            .service
            .get(&request.request_id)
            .await
            .expect("request")
            .one_sided_close_at()
            .expect("close slot");

        // Not yet stale: nothing changes.
        let swept = fx
            .service
            .auto_complete_sweep(closed_at + AUTO_COMPLETE_GRACE_MS - 1)
            .await
            .expect("early sweep");
        assert_eq!(swept, 0);

        let swept = fx
            .service
            .auto_complete_sweep(closed_at + AUTO_COMPLETE_GRACE_MS)
            .await
            .expect("sweep");
        assert_eq!(swept, 1);

        let stored = fx.service.get(&request.request_id).await.expect("request");
        assert_eq!(stored.status, SupportStatus::Completed);
        assert_eq!(stored.from_user_rating, Some(AUTO_COMPLETE_DEFAULT_RATING));
        assert_eq!(stored.to_user_rating, Some(5));
        assert!(stored.both_closed());

        // The sweep is idempotent once completed.
        let swept_again = fx
            .service
            .auto_complete_sweep(closed_at + 2 * AUTO_COMPLETE_GRACE_MS)
            .await
            .expect("sweep again");
        assert_eq!(swept_again, 0);
    }
}
