use crate::realtime::PushEvent;

/// Fire-and-forget push fan-out. Implementations must never block the
/// caller and must swallow delivery failures; a missed push is recovered by
/// the client re-fetching the timeline.
pub trait EventPublisher: Send + Sync {
    fn publish_to_user(&self, user_id: &str, event: &PushEvent);
    fn publish_to_thread(&self, thread_id: &str, event: &PushEvent);
}
