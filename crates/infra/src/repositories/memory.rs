use std::collections::HashMap;
use std::sync::Arc;

use duet_domain::DomainResult;
use duet_domain::error::DomainError;
use duet_domain::ports::BoxFuture;
use duet_domain::ports::profile::{ProfileRepository, ProfileSummary};
use duet_domain::ports::support::SupportRequestRepository;
use duet_domain::ports::threads::ThreadRepository;
use duet_domain::ports::tips::TipRepository;
use duet_domain::support::{SupportReport, SupportRequest, SupportStatus};
use duet_domain::threads::{Message, MessageContext, Thread};
use duet_domain::tips::TokenTransfer;
use duet_domain::util::participant_pair_key;
use tokio::sync::RwLock;

/// Reference implementation of the persistence gateway, selected by
/// `data_backend=memory`. All maps live behind a tokio `RwLock`, so every
/// port operation is a single atomic critical section.
#[derive(Default)]
pub struct InMemoryThreadRepository {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
    primary_pairs: Arc<RwLock<HashMap<String, String>>>,
    messages: Arc<RwLock<HashMap<String, Message>>>,
    message_by_request: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl InMemoryThreadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_messages(mut messages: Vec<Message>) -> Vec<Message> {
        messages.sort_by(|a, b| {
            a.sent_at_ms
                .cmp(&b.sent_at_ms)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        messages
    }
}

impl ThreadRepository for InMemoryThreadRepository {
    fn create_thread(&self, thread: &Thread) -> BoxFuture<'_, DomainResult<Thread>> {
        let thread = thread.clone();
        let threads = self.threads.clone();
        let primary_pairs = self.primary_pairs.clone();
        Box::pin(async move {
            // Claim the pair key and insert under one write lock so racing
            // first-contact sends cannot both pass the uniqueness check.
            let mut pairs = primary_pairs.write().await;
            let mut threads = threads.write().await;
            if threads.contains_key(&thread.thread_id) {
                return Err(DomainError::Conflict);
            }
            if !thread.is_support_thread {
                let pair_key = participant_pair_key(&thread.user_one_id, &thread.user_two_id);
                if pairs.contains_key(&pair_key) {
                    return Err(DomainError::Conflict);
                }
                pairs.insert(pair_key, thread.thread_id.clone());
            }
            threads.insert(thread.thread_id.clone(), thread.clone());
            Ok(thread)
        })
    }

    fn get_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
        let thread_id = thread_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move { Ok(threads.read().await.get(&thread_id).cloned()) })
    }

    fn find_primary_by_participants(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
        let pair_key = participant_pair_key(user_a, user_b);
        let threads = self.threads.clone();
        let primary_pairs = self.primary_pairs.clone();
        Box::pin(async move {
            let pairs = primary_pairs.read().await;
            let Some(thread_id) = pairs.get(&pair_key) else {
                return Ok(None);
            };
            Ok(threads.read().await.get(thread_id).cloned())
        })
    }

    fn list_threads_by_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Thread>>> {
        let user_id = user_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move {
            Ok(threads
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
        let threads = self.threads.clone();
        Box::pin(async move {
            let mut threads = threads.write().await;
            let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
            if thread.user_one_id == user_id {
                thread.unread_count_user_one = thread.unread_count_user_one.saturating_add(1);
            } else if thread.user_two_id == user_id {
                thread.unread_count_user_two = thread.unread_count_user_two.saturating_add(1);
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
        let threads = self.threads.clone();
        Box::pin(async move {
            let mut threads = threads.write().await;
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
        let threads = self.threads.clone();
        Box::pin(async move {
            let mut threads = threads.write().await;
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
        let threads = self.threads.clone();
        Box::pin(async move {
            let mut threads = threads.write().await;
            let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
            thread.is_active = is_active;
            Ok(thread.clone())
        })
    }

    fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let message = message.clone();
        let messages = self.messages.clone();
        let message_by_request = self.message_by_request.clone();
        Box::pin(async move {
            let request_key = (message.thread_id.clone(), message.request_id.clone());
            let mut by_request = message_by_request.write().await;
            if let Some(existing_id) = by_request.get(&request_key) {
                let messages = messages.read().await;
                if let Some(existing) = messages.get(existing_id) {
                    return Ok(existing.clone());
                }
                by_request.remove(&request_key);
            }

            let mut messages = messages.write().await;
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
        let messages = self.messages.clone();
        Box::pin(async move { Ok(messages.read().await.get(&message_id).cloned()) })
    }

    fn get_message_by_request_id(
        &self,
        thread_id: &str,
        request_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let request_key = (thread_id.to_string(), request_id.to_string());
        let messages = self.messages.clone();
        let message_by_request = self.message_by_request.clone();
        Box::pin(async move {
            let by_request = message_by_request.read().await;
            let Some(message_id) = by_request.get(&request_key) else {
                return Ok(None);
            };
            Ok(messages.read().await.get(message_id).cloned())
        })
    }

    fn list_messages(
        &self,
        thread_id: &str,
        contexts: &[MessageContext],
    ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let thread_id = thread_id.to_string();
        let contexts = contexts.to_vec();
        let messages = self.messages.clone();
        Box::pin(async move {
            let messages: Vec<_> = messages
                .read()
                .await
                .values()
                .filter(|message| {
                    message.thread_id == thread_id && contexts.contains(&message.context)
                })
                .cloned()
                .collect();
            Ok(Self::sort_messages(messages))
        })
    }

    fn mark_messages_read(
        &self,
        thread_id: &str,
        reader_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let thread_id = thread_id.to_string();
        let reader_id = reader_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut messages = messages.write().await;
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
            Ok(Self::sort_messages(flipped))
        })
    }

    fn mark_message_read(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Message>> {
        let message_id = message_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut messages = messages.write().await;
            let message = messages.get_mut(&message_id).ok_or(DomainError::NotFound)?;
            message.is_read = true;
            Ok(message.clone())
        })
    }
}

#[derive(Default)]
pub struct InMemoryTipRepository {
    transfers: Arc<RwLock<Vec<TokenTransfer>>>,
}

impl InMemoryTipRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TipRepository for InMemoryTipRepository {
    fn create_transfer(
        &self,
        transfer: &TokenTransfer,
    ) -> BoxFuture<'_, DomainResult<TokenTransfer>> {
        let transfer = transfer.clone();
        let transfers = self.transfers.clone();
        Box::pin(async move {
            let mut transfers = transfers.write().await;
            if transfers
                .iter()
                .any(|existing| existing.transfer_id == transfer.transfer_id)
            {
                return Err(DomainError::Conflict);
            }
            transfers.push(transfer.clone());
            Ok(transfer)
        })
    }

    fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<TokenTransfer>>> {
        let user_a = user_a.to_string();
        let user_b = user_b.to_string();
        let transfers = self.transfers.clone();
        Box::pin(async move {
            let mut transfers: Vec<_> = transfers
                .read()
                .await
                .iter()
                .filter(|transfer| {
                    (transfer.from_user_id == user_a && transfer.to_user_id == user_b)
                        || (transfer.from_user_id == user_b && transfer.to_user_id == user_a)
                })
                .cloned()
                .collect();
            transfers.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.transfer_id.cmp(&b.transfer_id))
            });
            Ok(transfers)
        })
    }

    fn sum_between(
        &self,
        from_user_id: &str,
        to_user_id: &str,
    ) -> BoxFuture<'_, DomainResult<i64>> {
        let from_user_id = from_user_id.to_string();
        let to_user_id = to_user_id.to_string();
        let transfers = self.transfers.clone();
        Box::pin(async move {
            Ok(transfers
                .read()
                .await
                .iter()
                .filter(|transfer| {
                    transfer.from_user_id == from_user_id && transfer.to_user_id == to_user_id
                })
                .map(|transfer| transfer.amount)
                .sum())
        })
    }
}

#[derive(Default)]
pub struct InMemorySupportRequestRepository {
    requests: Arc<RwLock<HashMap<String, SupportRequest>>>,
    reports: Arc<RwLock<Vec<SupportReport>>>,
}

impl InMemorySupportRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_requests(mut requests: Vec<SupportRequest>) -> Vec<SupportRequest> {
        requests.sort_by(|a, b| {
            a.sent_at_ms
                .cmp(&b.sent_at_ms)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        requests
    }
}

impl SupportRequestRepository for InMemorySupportRequestRepository {
    fn create_request(
        &self,
        request: &SupportRequest,
    ) -> BoxFuture<'_, DomainResult<SupportRequest>> {
        let request = request.clone();
        let requests = self.requests.clone();
        Box::pin(async move {
            let mut requests = requests.write().await;
            if requests.contains_key(&request.request_id) {
                return Err(DomainError::Conflict);
            }
            requests.insert(request.request_id.clone(), request.clone());
            Ok(request)
        })
    }

    fn get_request(
        &self,
        request_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<SupportRequest>>> {
        let request_id = request_id.to_string();
        let requests = self.requests.clone();
        Box::pin(async move { Ok(requests.read().await.get(&request_id).cloned()) })
    }

    fn list_by_participant(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<SupportRequest>>> {
        let user_id = user_id.to_string();
        let requests = self.requests.clone();
        Box::pin(async move {
            let requests: Vec<_> = requests
                .read()
                .await
                .values()
                .filter(|request| request.is_participant(&user_id))
                .cloned()
                .collect();
            Ok(Self::sort_requests(requests))
        })
    }

    fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<SupportRequest>>> {
        let user_a = user_a.to_string();
        let user_b = user_b.to_string();
        let requests = self.requests.clone();
        Box::pin(async move {
            let requests: Vec<_> = requests
                .read()
                .await
                .values()
                .filter(|request| {
                    request.is_participant(&user_a) && request.is_participant(&user_b)
                })
                .cloned()
                .collect();
            Ok(Self::sort_requests(requests))
        })
    }

    fn set_status(
        &self,
        request_id: &str,
        expected: &[SupportStatus],
        to: SupportStatus,
        responded_at_ms: Option<i64>,
        clear_thread: bool,
    ) -> BoxFuture<'_, DomainResult<SupportRequest>> {
        let request_id = request_id.to_string();
        let expected = expected.to_vec();
        let requests = self.requests.clone();
        Box::pin(async move {
            let mut requests = requests.write().await;
            let request = requests.get_mut(&request_id).ok_or(DomainError::NotFound)?;
            if !expected.contains(&request.status) {
                return Err(DomainError::InvalidState(
                    "request is not in a state that allows this transition".into(),
                ));
            }
            request.status = to;
            if responded_at_ms.is_some() {
                request.responded_at_ms = responded_at_ms;
            }
            if clear_thread {
                request.thread_id = None;
            }
            Ok(request.clone())
        })
    }

    fn accept_request(
        &self,
        request_id: &str,
        thread_id: &str,
        responded_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<SupportRequest>> {
        let request_id = request_id.to_string();
        let thread_id = thread_id.to_string();
        let requests = self.requests.clone();
        Box::pin(async move {
            let mut requests = requests.write().await;
            let request = requests.get_mut(&request_id).ok_or(DomainError::NotFound)?;
            if request.status != SupportStatus::Pending {
                return Err(DomainError::InvalidState(
                    "only a pending request can be accepted".into(),
                ));
            }
            request.status = SupportStatus::Accepted;
            request.thread_id = Some(thread_id);
            request.responded_at_ms = Some(responded_at_ms);
            Ok(request.clone())
        })
    }

    fn record_close(
        &self,
        request_id: &str,
        closer_id: &str,
        rating: u8,
        closed_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<SupportRequest>> {
        let request_id = request_id.to_string();
        let closer_id = closer_id.to_string();
        let requests = self.requests.clone();
        Box::pin(async move {
            let mut requests = requests.write().await;
            let request = requests.get_mut(&request_id).ok_or(DomainError::NotFound)?;
            if !request.status.is_closable() {
                return Err(DomainError::InvalidState(
                    "only an accepted request can be closed".into(),
                ));
            }
            if request.from_user_id == closer_id {
                if request.closed_by_from_user_at_ms.is_some() {
                    return Err(DomainError::AlreadyDone(
                        "request already closed by this user".into(),
                    ));
                }
                request.closed_by_from_user_at_ms = Some(closed_at_ms);
                request.from_user_rating = Some(rating);
            } else if request.to_user_id == closer_id {
                if request.closed_by_to_user_at_ms.is_some() {
                    return Err(DomainError::AlreadyDone(
                        "request already closed by this user".into(),
                    ));
                }
                request.closed_by_to_user_at_ms = Some(closed_at_ms);
                request.to_user_rating = Some(rating);
            } else {
                return Err(DomainError::AccessDenied(
                    "only a participant can close this request".into(),
                ));
            }
            request.status = if request.both_closed() {
                SupportStatus::Completed
            } else {
                SupportStatus::AwaitingCompletion
            };
            Ok(request.clone())
        })
    }

    fn list_awaiting_completion(&self) -> BoxFuture<'_, DomainResult<Vec<SupportRequest>>> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let requests: Vec<_> = requests
                .read()
                .await
                .values()
                .filter(|request| request.status == SupportStatus::AwaitingCompletion)
                .cloned()
                .collect();
            Ok(Self::sort_requests(requests))
        })
    }

    fn create_report(
        &self,
        report: &SupportReport,
    ) -> BoxFuture<'_, DomainResult<SupportReport>> {
        let report = report.clone();
        let reports = self.reports.clone();
        Box::pin(async move {
            let mut reports = reports.write().await;
            if reports.iter().any(|existing| {
                existing.request_id == report.request_id
                    && existing.reporter_id == report.reporter_id
            }) {
                return Err(DomainError::Conflict);
            }
            reports.push(report.clone());
            Ok(report)
        })
    }

    fn find_report(
        &self,
        request_id: &str,
        reporter_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<SupportReport>>> {
        let request_id = request_id.to_string();
        let reporter_id = reporter_id.to_string();
        let reports = self.reports.clone();
        Box::pin(async move {
            Ok(reports
                .read()
                .await
                .iter()
                .find(|report| {
                    report.request_id == request_id && report.reporter_id == reporter_id
                })
                .cloned())
        })
    }
}

/// Read-only profile catalog stub. The real catalog is a collaborator
/// service; environments on the memory backend seed this map at startup.
#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: Arc<RwLock<HashMap<String, ProfileSummary>>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, profile: ProfileSummary) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

impl ProfileRepository for InMemoryProfileRepository {
    fn get_profile(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<ProfileSummary>>> {
        let user_id = user_id.to_string();
        let profiles = self.profiles.clone();
        Box::pin(async move { Ok(profiles.read().await.get(&user_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: &str, a: &str, b: &str, support: bool) -> Thread {
        Thread {
            thread_id: id.to_string(),
            user_one_id: a.to_string(),
            user_two_id: b.to_string(),
            is_support_thread: support,
            is_active: true,
            unread_count_user_one: 0,
            unread_count_user_two: 0,
            started_at_ms: 1_000,
            updated_at_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn primary_pair_uniqueness_survives_reversed_order() {
        let repo = InMemoryThreadRepository::new();
        repo.create_thread(&thread("t-1", "alice", "bob", false))
            .await
            .expect("first");
        let duplicate = repo
            .create_thread(&thread("t-2", "bob", "alice", false))
            .await;
        assert!(matches!(duplicate, Err(DomainError::Conflict)));

        // Support threads are exempt from the pair constraint.
        repo.create_thread(&thread("t-3", "alice", "bob", true))
            .await
            .expect("support thread");
        repo.create_thread(&thread("t-4", "alice", "bob", true))
            .await
            .expect("second support thread");
    }

    #[tokio::test]
    async fn record_close_is_single_shot_per_side() {
        let repo = InMemorySupportRequestRepository::new();
        repo.create_request(&SupportRequest {
            request_id: "sr-1".to_string(),
            from_user_id: "alice".to_string(),
            to_user_id: "bob".to_string(),
            status: SupportStatus::Accepted,
            kind: "GENERAL".to_string(),
            amount: 10,
            description: Some("help".to_string()),
            thread_id: Some("t-9".to_string()),
            from_user_rating: None,
            to_user_rating: None,
            closed_by_from_user_at_ms: None,
            closed_by_to_user_at_ms: None,
            sent_at_ms: 1_000,
            responded_at_ms: Some(1_500),
        })
        .await
        .expect("create");

        let first = repo
            .record_close("sr-1", "alice", 4, 2_000)
            .await
            .expect("first close");
        assert_eq!(first.status, SupportStatus::AwaitingCompletion);

        let repeat = repo.record_close("sr-1", "alice", 1, 2_100).await;
        assert!(matches!(repeat, Err(DomainError::AlreadyDone(_))));

        let second = repo
            .record_close("sr-1", "bob", 5, 2_200)
            .await
            .expect("second close");
        assert_eq!(second.status, SupportStatus::Completed);
        assert_eq!(second.from_user_rating, Some(4));
        assert_eq!(second.to_user_rating, Some(5));
    }
}
