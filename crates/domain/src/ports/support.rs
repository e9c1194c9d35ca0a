use crate::DomainResult;
use crate::support::{SupportReport, SupportRequest, SupportStatus};

#[allow(clippy::needless_pass_by_value)]
pub trait SupportRequestRepository: Send + Sync {
    fn create_request(
        &self,
        request: &SupportRequest,
    ) -> crate::ports::BoxFuture<'_, DomainResult<SupportRequest>>;

    fn get_request(
        &self,
        request_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<SupportRequest>>>;

    fn list_by_participant(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<SupportRequest>>>;

    fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<SupportRequest>>>;

    /// Guarded status update: fails with `InvalidState` unless the stored
    /// status is one of `expected`. `clear_thread` drops the thread
    /// reference (cancel path).
    fn set_status(
        &self,
        request_id: &str,
        expected: &[SupportStatus],
        to: SupportStatus,
        responded_at_ms: Option<i64>,
        clear_thread: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<SupportRequest>>;

    /// Accept transition: attaches the freshly created support thread and
    /// moves PENDING -> ACCEPTED in one guarded update.
    fn accept_request(
        &self,
        request_id: &str,
        thread_id: &str,
        responded_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<SupportRequest>>;

    /// One atomic check-and-set per (request, closer): fails with
    /// `AlreadyDone` when that side's close slot is occupied, otherwise
    /// records the slot and derives COMPLETED / AWAITING_COMPLETION from
    /// the resulting pair of slots.
    fn record_close(
        &self,
        request_id: &str,
        closer_id: &str,
        rating: u8,
        closed_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<SupportRequest>>;

    fn list_awaiting_completion(
        &self,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<SupportRequest>>>;

    fn create_report(
        &self,
        report: &SupportReport,
    ) -> crate::ports::BoxFuture<'_, DomainResult<SupportReport>>;

    fn find_report(
        &self,
        request_id: &str,
        reporter_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<SupportReport>>>;
}
