use std::sync::Arc;

use duet_domain::idempotency::{IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore};
use duet_domain::ports::idempotency::IdempotencyStore;
use duet_domain::ports::jobs::JobQueue;
use duet_domain::ports::profile::ProfileRepository;
use duet_domain::ports::realtime::EventPublisher;
use duet_domain::ports::support::SupportRequestRepository;
use duet_domain::ports::threads::ThreadRepository;
use duet_domain::ports::tips::TipRepository;
use duet_domain::support::SupportService;
use duet_domain::threads::ThreadService;
use duet_domain::timeline::TimelineService;
use duet_domain::tips::TipService;
use duet_infra::config::AppConfig;
use duet_infra::idempotency::RedisIdempotencyStore;
use duet_infra::jobs::RedisJobQueue;
use duet_infra::repositories::{
    InMemoryProfileRepository, InMemorySupportRequestRepository, InMemoryThreadRepository,
    InMemoryTipRepository,
};

use crate::realtime::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub idempotency: IdempotencyService,
    pub thread_repo: Arc<dyn ThreadRepository>,
    pub tip_repo: Arc<dyn TipRepository>,
    pub support_repo: Arc<dyn SupportRequestRepository>,
    pub profile_repo: Arc<dyn ProfileRepository>,
    pub notification_queue: Option<Arc<dyn JobQueue>>,
    pub realtime: RealtimeHub,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let idempotency_store: Arc<dyn IdempotencyStore> = if config.is_test() {
            Arc::new(InMemoryIdempotencyStore::new(config.idempotency_prefix.as_str()))
        } else {
            match RedisIdempotencyStore::connect_with_prefix(
                &config.redis_url,
                config.idempotency_prefix.as_str(),
            )
            .await
            {
                Ok(store) => Arc::new(store),
                Err(err) if !config.is_production() => {
                    tracing::warn!(error = %err, "redis unavailable; using in-memory idempotency store");
                    Arc::new(InMemoryIdempotencyStore::new(config.idempotency_prefix.as_str()))
                }
                Err(err) => return Err(err.into()),
            }
        };

        let notification_queue: Option<Arc<dyn JobQueue>> = if config.is_test() {
            None
        } else {
            match RedisJobQueue::connect_with_prefix(
                &config.redis_url,
                config.notification_queue_prefix.as_str(),
            )
            .await
            {
                Ok(queue) => Some(Arc::new(queue)),
                // Notification submission is fire-and-forget by contract, so
                // a missing queue degrades rather than failing startup.
                Err(err) => {
                    tracing::warn!(error = %err, "redis unavailable; notification jobs disabled");
                    None
                }
            }
        };

        if !config.data_backend.eq_ignore_ascii_case("memory") {
            tracing::warn!(
                backend = %config.data_backend,
                "unknown data backend; falling back to memory"
            );
        }

        Ok(Self::with_repositories(
            config,
            idempotency_store,
            Arc::new(InMemoryThreadRepository::new()),
            Arc::new(InMemoryTipRepository::new()),
            Arc::new(InMemorySupportRequestRepository::new()),
            Arc::new(InMemoryProfileRepository::new()),
            notification_queue,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_repositories(
        config: AppConfig,
        idempotency_store: Arc<dyn IdempotencyStore>,
        thread_repo: Arc<dyn ThreadRepository>,
        tip_repo: Arc<dyn TipRepository>,
        support_repo: Arc<dyn SupportRequestRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        notification_queue: Option<Arc<dyn JobQueue>>,
    ) -> Self {
        let idempotency =
            IdempotencyService::new(idempotency_store, IdempotencyConfig::default());
        Self {
            config,
            idempotency,
            thread_repo,
            tip_repo,
            support_repo,
            profile_repo,
            notification_queue,
            realtime: RealtimeHub::new(),
        }
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        Arc::new(self.realtime.clone())
    }

    pub fn thread_service(&self) -> ThreadService {
        ThreadService::new(
            self.thread_repo.clone(),
            self.publisher(),
            self.notification_queue.clone(),
        )
    }

    pub fn tip_service(&self) -> TipService {
        TipService::new(self.tip_repo.clone(), self.thread_service())
    }

    pub fn support_service(&self) -> SupportService {
        SupportService::new(self.support_repo.clone(), self.thread_service())
    }

    pub fn timeline_service(&self) -> TimelineService {
        TimelineService::new(
            self.thread_repo.clone(),
            self.tip_repo.clone(),
            self.support_repo.clone(),
            self.profile_repo.clone(),
        )
    }
}
