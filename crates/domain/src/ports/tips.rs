use crate::DomainResult;
use crate::tips::TokenTransfer;

#[allow(clippy::needless_pass_by_value)]
pub trait TipRepository: Send + Sync {
    fn create_transfer(
        &self,
        transfer: &TokenTransfer,
    ) -> crate::ports::BoxFuture<'_, DomainResult<TokenTransfer>>;

    /// Transfers in either direction between the pair, ascending by
    /// `(created_at_ms, transfer_id)`. Tips carry no thread reference, so
    /// the pair is the only lookup key.
    fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<TokenTransfer>>>;

    fn sum_between(
        &self,
        from_user_id: &str,
        to_user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<i64>>;
}
