use crate::DomainResult;
use crate::threads::{Message, MessageContext, Thread};

#[allow(clippy::needless_pass_by_value)]
pub trait ThreadRepository: Send + Sync {
    /// Inserting a primary thread for a pair that already has one must
    /// return `DomainError::Conflict`; support threads always insert.
    fn create_thread(&self, thread: &Thread) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn get_thread(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Thread>>>;

    fn find_primary_by_participants(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Thread>>>;

    fn list_threads_by_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Thread>>>;

    /// Atomic counter bump for the given participant; also advances
    /// `updated_at_ms` to `occurred_at_ms` when it is newer.
    fn increment_unread(
        &self,
        thread_id: &str,
        user_id: &str,
        occurred_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn decrement_unread(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn reset_unread(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn set_active(
        &self,
        thread_id: &str,
        is_active: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn create_message(
        &self,
        message: &Message,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Message>>;

    fn get_message(
        &self,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    fn get_message_by_request_id(
        &self,
        thread_id: &str,
        request_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Messages of the thread whose context is in `contexts`, ascending by
    /// `(sent_at_ms, message_id)`.
    fn list_messages(
        &self,
        thread_id: &str,
        contexts: &[MessageContext],
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    /// Flips every unread message in the thread not sent by `reader_id` and
    /// returns only the rows that actually changed state.
    fn mark_messages_read(
        &self,
        thread_id: &str,
        reader_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    /// Flips a single message; returns the stored row whether or not it
    /// changed state (callers compare `is_read` beforehand).
    fn mark_message_read(
        &self,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Message>>;
}
