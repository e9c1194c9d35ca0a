use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::profile::{ProfileRepository, ProfileSummary};
use crate::ports::support::SupportRequestRepository;
use crate::ports::threads::ThreadRepository;
use crate::ports::tips::TipRepository;
use crate::support::SupportRequest;
use crate::threads::{Message, MessageContext, MessageKind, Thread};
use crate::tips::TokenTransfer;

const MAX_PAGE_SIZE: usize = 200;
const DEFAULT_PAGE_SIZE: usize = 50;

/// One unit of the merged thread view. Messages, transfers, and requests
/// live in three independent stores with no shared sequence; the timestamp
/// is the only ordering key they have in common.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum TimelineItem {
    Message {
        message: Message,
        sender: ProfileSummary,
        occurred_at_ms: i64,
    },
    TokenTransfer {
        transfer: TokenTransfer,
        sender: ProfileSummary,
        occurred_at_ms: i64,
    },
    SupportRequest {
        request: SupportRequest,
        sender: ProfileSummary,
        occurred_at_ms: i64,
    },
}

impl TimelineItem {
    pub fn occurred_at_ms(&self) -> i64 {
        match self {
            TimelineItem::Message { occurred_at_ms, .. }
            | TimelineItem::TokenTransfer { occurred_at_ms, .. }
            | TimelineItem::SupportRequest { occurred_at_ms, .. } => *occurred_at_ms,
        }
    }

    fn sort_id(&self) -> &str {
        match self {
            TimelineItem::Message { message, .. } => &message.message_id,
            TimelineItem::TokenTransfer { transfer, .. } => &transfer.transfer_id,
            TimelineItem::SupportRequest { request, .. } => &request.request_id,
        }
    }

    fn sender_id(&self) -> &str {
        match self {
            TimelineItem::Message { message, .. } => &message.sender_id,
            TimelineItem::TokenTransfer { transfer, .. } => &transfer.from_user_id,
            TimelineItem::SupportRequest { request, .. } => &request.from_user_id,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TimelinePage {
    pub limit: usize,
    pub offset: usize,
}

pub fn build_timeline_page(limit: Option<usize>, offset: Option<usize>) -> TimelinePage {
    TimelinePage {
        limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: offset.unwrap_or(0),
    }
}

#[derive(Clone)]
pub struct TimelineService {
    threads: Arc<dyn ThreadRepository>,
    tips: Arc<dyn TipRepository>,
    support: Arc<dyn SupportRequestRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl TimelineService {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        tips: Arc<dyn TipRepository>,
        support: Arc<dyn SupportRequestRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            threads,
            tips,
            support,
            profiles,
        }
    }

    /// Produces the merged, ascending view of a thread. Support threads are
    /// hermetically sealed: only their own support-context messages appear,
    /// never tips or request summaries. Pagination happens strictly after
    /// the full sort; slicing pre-sort would interleave the streams wrong.
    pub async fn fetch(
        &self,
        actor: &ActorIdentity,
        thread_id: &str,
        page: TimelinePage,
    ) -> DomainResult<Vec<TimelineItem>> {
        let thread = self
            .threads
            .get_thread(thread_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if !thread.is_participant(&actor.user_id) {
            return Err(DomainError::AccessDenied(
                "user is not a participant in this thread".into(),
            ));
        }

        let mut items = if thread.is_support_thread {
            self.support_thread_items(&thread).await?
        } else {
            self.primary_thread_items(&thread).await?
        };

        items.sort_by(|a, b| {
            a.occurred_at_ms()
                .cmp(&b.occurred_at_ms())
                .then_with(|| a.sort_id().cmp(b.sort_id()))
        });

        let items = self.resolve_senders(items).await?;
        Ok(items
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn support_thread_items(&self, thread: &Thread) -> DomainResult<Vec<TimelineItem>> {
        let messages = self
            .threads
            .list_messages(&thread.thread_id, &[MessageContext::Support])
            .await?;
        Ok(messages.into_iter().map(message_item).collect())
    }

    async fn primary_thread_items(&self, thread: &Thread) -> DomainResult<Vec<TimelineItem>> {
        let messages = self
            .threads
            .list_messages(&thread.thread_id, &[MessageContext::Dm])
            .await?;
        let transfers = self
            .tips
            .list_between(&thread.user_one_id, &thread.user_two_id)
            .await?;
        let requests = self
            .support
            .list_between(&thread.user_one_id, &thread.user_two_id)
            .await?;

        let mut items: Vec<TimelineItem> = messages
            .into_iter()
            // Tip notices are the courtesy side-channel of a transfer; the
            // transfer itself is the timeline item.
            .filter(|message| message.kind != MessageKind::TipNotice)
            .map(message_item)
            .collect();
        items.extend(transfers.into_iter().map(|transfer| {
            let occurred_at_ms = transfer.created_at_ms;
            TimelineItem::TokenTransfer {
                sender: ProfileSummary::bare(&transfer.from_user_id),
                transfer,
                occurred_at_ms,
            }
        }));
        items.extend(
            requests
                .into_iter()
                // Description-less requests are internal plumbing rows.
                .filter(|request| {
                    request
                        .description
                        .as_deref()
                        .is_some_and(|description| !description.trim().is_empty())
                })
                .map(|request| {
                    let occurred_at_ms = request.sent_at_ms;
                    TimelineItem::SupportRequest {
                        sender: ProfileSummary::bare(&request.from_user_id),
                        request,
                        occurred_at_ms,
                    }
                }),
        );
        Ok(items)
    }

    async fn resolve_senders(
        &self,
        items: Vec<TimelineItem>,
    ) -> DomainResult<Vec<TimelineItem>> {
        let mut profiles: HashMap<String, ProfileSummary> = HashMap::new();
        for item in &items {
            let sender_id = item.sender_id().to_string();
            if profiles.contains_key(&sender_id) {
                continue;
            }
            let profile = self
                .profiles
                .get_profile(&sender_id)
                .await?
                .unwrap_or_else(|| ProfileSummary::bare(&sender_id));
            profiles.insert(sender_id, profile);
        }

        Ok(items
            .into_iter()
            .map(|mut item| {
                let resolved = profiles
                    .get(item.sender_id())
                    .cloned()
                    .unwrap_or_else(|| ProfileSummary::bare(item.sender_id()));
                match &mut item {
                    TimelineItem::Message { sender, .. }
                    | TimelineItem::TokenTransfer { sender, .. }
                    | TimelineItem::SupportRequest { sender, .. } => *sender = resolved,
                }
                item
            })
            .collect())
    }
}

fn message_item(message: Message) -> TimelineItem {
    let occurred_at_ms = message.sent_at_ms;
    TimelineItem::Message {
        sender: ProfileSummary::bare(&message.sender_id),
        message,
        occurred_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use crate::support::testing::MockSupportRepo;
    use crate::support::{SupportStatus, SupportService, CreateSupportRequestInput};
    use crate::threads::testing::{MockThreadRepo, RecordingPublisher};
    use crate::threads::{MessageKind, SendMessageInput, ThreadService};
    use crate::tips::testing::MockTipRepo;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockProfileRepo {
        profiles: RwLock<StdHashMap<String, ProfileSummary>>,
    }

    impl MockProfileRepo {
        async fn seed(&self, user_id: &str, display_name: &str, title: &str) {
            self.profiles.write().await.insert(
                user_id.to_string(),
                ProfileSummary {
                    user_id: user_id.to_string(),
                    display_name: display_name.to_string(),
                    title: Some(title.to_string()),
                    avatar_url: None,
                },
            );
        }
    }

    impl ProfileRepository for MockProfileRepo {
        fn get_profile(
            &self,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<ProfileSummary>>> {
            let user_id = user_id.to_string();
            Box::pin(async move { Ok(self.profiles.read().await.get(&user_id).cloned()) })
        }
    }

    struct Fixture {
        threads: Arc<MockThreadRepo>,
        tips: Arc<MockTipRepo>,
        support: Arc<MockSupportRepo>,
        profiles: Arc<MockProfileRepo>,
        thread_service: ThreadService,
        timeline: TimelineService,
    }

    fn fixture() -> Fixture {
        let threads = Arc::new(MockThreadRepo::default());
        let tips = Arc::new(MockTipRepo::default());
        let support = Arc::new(MockSupportRepo::default());
        let profiles = Arc::new(MockProfileRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let thread_service = ThreadService::new(threads.clone(), publisher, None);
        let timeline = TimelineService::new(
            threads.clone(),
            tips.clone(),
            support.clone(),
            profiles.clone(),
        );
        Fixture {
            threads,
            tips,
            support,
            profiles,
            thread_service,
            timeline,
        }
    }

    fn actor(user_id: &str) -> ActorIdentity {
        ActorIdentity::with_user_id(user_id)
    }

    fn page() -> TimelinePage {
        build_timeline_page(None, None)
    }

    fn transfer(id: &str, from: &str, to: &str, amount: i64, at: i64) -> crate::tips::TokenTransfer {
        crate::tips::TokenTransfer {
            transfer_id: id.to_string(),
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            amount,
            reason: None,
            created_at_ms: at,
        }
    }

    fn request(id: &str, from: &str, to: &str, description: Option<&str>, at: i64) -> SupportRequest {
        SupportRequest {
            request_id: id.to_string(),
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            status: SupportStatus::Pending,
            kind: "GENERAL".to_string(),
            amount: 10,
            description: description.map(str::to_string),
            thread_id: None,
            from_user_rating: None,
            to_user_rating: None,
            closed_by_from_user_at_ms: None,
            closed_by_to_user_at_ms: None,
            sent_at_ms: at,
            responded_at_ms: None,
        }
    }

    async fn send(fx: &Fixture, from: &str, thread_id: &str, body: &str, req: &str, at: i64) {
        fx.thread_service
            .record_message(
                &actor(from),
                SendMessageInput {
                    thread_id: thread_id.to_string(),
                    body: body.to_string(),
                    context: MessageContext::Dm,
                    kind: MessageKind::User,
                    request_id: req.to_string(),
                    correlation_id: "corr".to_string(),
                    occurred_at_ms: Some(at),
                },
            )
            .await
            .expect("send");
    }

    #[tokio::test]
    async fn merges_three_streams_in_timestamp_order() {
        let fx = fixture();
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");

        // Inserted deliberately out of chronological order.
        send(&fx, "alice", &thread.thread_id, "middle", "req-m", 2_000).await;
        fx.tips
            .transfers
            .write()
            .await
            .push(transfer("tr-1", "bob", "alice", 100, 1_000));
        fx.support.requests.write().await.insert(
            "sr-1".to_string(),
            request("sr-1", "alice", "bob", Some("need help"), 3_000),
        );

        let items = fx
            .timeline
            .fetch(&actor("alice"), &thread.thread_id, page())
            .await
            .expect("timeline");

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], TimelineItem::TokenTransfer { .. }));
        assert!(matches!(items[1], TimelineItem::Message { .. }));
        assert!(matches!(items[2], TimelineItem::SupportRequest { .. }));
        let stamps: Vec<_> = items.iter().map(TimelineItem::occurred_at_ms).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[tokio::test]
    async fn tip_notice_messages_are_not_double_represented() {
        let fx = fixture();
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");

        fx.thread_service
            .record_message(
                &actor("alice"),
                SendMessageInput {
                    thread_id: thread.thread_id.clone(),
                    body: "thanks".to_string(),
                    context: MessageContext::Dm,
                    kind: MessageKind::TipNotice,
                    request_id: "tip:tr-1".to_string(),
                    correlation_id: "corr".to_string(),
                    occurred_at_ms: Some(1_000),
                },
            )
            .await
            .expect("courtesy");
        fx.tips
            .transfers
            .write()
            .await
            .push(transfer("tr-1", "alice", "bob", 100, 1_000));

        let items = fx
            .timeline
            .fetch(&actor("bob"), &thread.thread_id, page())
            .await
            .expect("timeline");

        assert_eq!(items.len(), 1);
        match &items[0] {
            TimelineItem::TokenTransfer { transfer, .. } => assert_eq!(transfer.amount, 100),
            other => panic!("expected transfer item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn support_thread_is_sealed_from_social_content() {
        let fx = fixture();
        let publisher = Arc::new(RecordingPublisher::default());
        let support_service = SupportService::new(
            fx.support.clone(),
            ThreadService::new(fx.threads.clone(), publisher, None),
        );

        let request = support_service
            .create(
                &actor("alice"),
                CreateSupportRequestInput {
                    to_user_id: "bob".to_string(),
                    kind: "GENERAL".to_string(),
                    amount: 50,
                    description: "need help".to_string(),
                    request_id: "req-1".to_string(),
                    correlation_id: "corr-1".to_string(),
                },
            )
            .await
            .expect("create");
        let request = support_service
            .accept(&actor("bob"), &request.request_id)
            .await
            .expect("accept");
        let support_thread_id = request.thread_id.clone().expect("support thread");

        // A support-context message in the escalated thread, a tip between
        // the same pair, and a DM in the primary thread.
        fx.thread_service
            .record_message(
                &actor("alice"),
                SendMessageInput {
                    thread_id: support_thread_id.clone(),
                    body: "here is the problem".to_string(),
                    context: MessageContext::Support,
                    kind: MessageKind::User,
                    request_id: "req-s".to_string(),
                    correlation_id: "corr".to_string(),
                    occurred_at_ms: Some(5_000),
                },
            )
            .await
            .expect("support message");
        fx.tips
            .transfers
            .write()
            .await
            .push(transfer("tr-1", "alice", "bob", 25, 6_000));
        let primary = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("primary");
        send(&fx, "alice", &primary.thread_id, "social hello", "req-d", 7_000).await;

        let support_items = fx
            .timeline
            .fetch(&actor("bob"), &support_thread_id, page())
            .await
            .expect("support timeline");
        assert_eq!(support_items.len(), 1);
        match &support_items[0] {
            TimelineItem::Message { message, .. } => {
                assert_eq!(message.context, MessageContext::Support);
            }
            other => panic!("expected message item, got {other:?}"),
        }

        let primary_items = fx
            .timeline
            .fetch(&actor("bob"), &primary.thread_id, page())
            .await
            .expect("primary timeline");
        // DM + tip + request summary, but never the support-context message.
        assert!(primary_items.iter().all(|item| match item {
            TimelineItem::Message { message, .. } => message.context == MessageContext::Dm,
            _ => true,
        }));
        assert_eq!(primary_items.len(), 3);
    }

    #[tokio::test]
    async fn plumbing_requests_without_description_are_hidden() {
        let fx = fixture();
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");

        fx.support.requests.write().await.insert(
            "sr-visible".to_string(),
            request("sr-visible", "alice", "bob", Some("real ask"), 1_000),
        );
        fx.support.requests.write().await.insert(
            "sr-hidden".to_string(),
            request("sr-hidden", "alice", "bob", None, 2_000),
        );

        let items = fx
            .timeline
            .fetch(&actor("alice"), &thread.thread_id, page())
            .await
            .expect("timeline");
        assert_eq!(items.len(), 1);
        match &items[0] {
            TimelineItem::SupportRequest { request, .. } => {
                assert_eq!(request.request_id, "sr-visible");
            }
            other => panic!("expected request item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pagination_applies_after_the_full_sort() {
        let fx = fixture();
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");

        send(&fx, "alice", &thread.thread_id, "late", "req-1", 9_000).await;
        fx.tips
            .transfers
            .write()
            .await
            .push(transfer("tr-1", "alice", "bob", 10, 1_000));
        fx.tips
            .transfers
            .write()
            .await
            .push(transfer("tr-2", "bob", "alice", 20, 5_000));

        let middle = fx
            .timeline
            .fetch(
                &actor("alice"),
                &thread.thread_id,
                TimelinePage {
                    limit: 1,
                    offset: 1,
                },
            )
            .await
            .expect("page");
        assert_eq!(middle.len(), 1);
        // Offset counts against the merged order, so the middle item is the
        // 5_000ms transfer even though the message store was queried first.
        assert_eq!(middle[0].occurred_at_ms(), 5_000);
    }

    #[tokio::test]
    async fn senders_are_denormalized_from_the_profile_catalog() {
        let fx = fixture();
        fx.profiles.seed("alice", "Alice W.", "Plant expert").await;
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");
        send(&fx, "alice", &thread.thread_id, "hello", "req-1", 1_000).await;

        let items = fx
            .timeline
            .fetch(&actor("bob"), &thread.thread_id, page())
            .await
            .expect("timeline");
        match &items[0] {
            TimelineItem::Message { sender, .. } => {
                assert_eq!(sender.display_name, "Alice W.");
                assert_eq!(sender.title.as_deref(), Some("Plant expert"));
            }
            other => panic!("expected message item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn outsiders_cannot_fetch_a_timeline() {
        let fx = fixture();
        let thread = fx
            .thread_service
            .get_or_create_primary("alice", "bob")
            .await
            .expect("thread");
        let err = fx
            .timeline
            .fetch(&actor("mallory"), &thread.thread_id, page())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AccessDenied(_)));
    }

    #[test]
    fn page_builder_clamps_limits() {
        let page = build_timeline_page(Some(10_000), Some(3));
        assert_eq!(page.limit, 200);
        assert_eq!(page.offset, 3);
        let page = build_timeline_page(Some(0), None);
        assert_eq!(page.limit, 1);
        assert_eq!(page.offset, 0);
    }
}
