//! Ledger client boundary.

use async_trait::async_trait;
use seatledger_types::{
    EventId, ExternalResult, LedgerTicketView, LedgerTokenId, MintReceipt, MintRequest, TxHash,
    WalletAddress,
};

/// Transactions and reads against the ticket ledger.
///
/// The ledger is never rolled back. Callers compensate by issuing opposite
/// transactions or by abandoning relational state.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Mint a non-transferable ticket token bound to `request.owner`.
    async fn mint(&self, request: &MintRequest) -> ExternalResult<MintReceipt>;

    /// Current owner of `token`. Fails if the token does not exist.
    async fn owner_of(&self, token: LedgerTokenId) -> ExternalResult<WalletAddress>;

    /// Ledger bookkeeping for `token`. A missing token yields a zeroed view
    /// (see [`LedgerTicketView::exists`]).
    async fn ticket_view(&self, token: LedgerTokenId) -> ExternalResult<LedgerTicketView>;

    /// Record a cancellation and return the ledger's reopen time (epoch
    /// seconds).
    async fn mark_cancelled(&self, token: LedgerTokenId) -> ExternalResult<i64>;

    /// Acknowledge that a cancelled token's seat went back on sale. Only
    /// accepted once the reopen time has passed; repeats are no-ops.
    async fn acknowledge_reopen(&self, token: LedgerTokenId) -> ExternalResult<TxHash>;

    /// Record venue admission. Reverts if already used or cancelled.
    async fn mark_used(&self, token: LedgerTokenId) -> ExternalResult<TxHash>;

    /// Duplicate-mint guard: has `owner` already minted for `event_id`?
    async fn has_minted_for_event(
        &self,
        owner: &WalletAddress,
        event_id: EventId,
    ) -> ExternalResult<bool>;

    /// Register an identity proof digest against `token`; sets the token's
    /// face-verified flag.
    async fn register_identity_proof(
        &self,
        token: LedgerTokenId,
        proof_hash: [u8; 32],
    ) -> ExternalResult<TxHash>;

    /// Every token minted for `event_id`, in mint order.
    async fn minted_tokens(&self, event_id: EventId) -> ExternalResult<Vec<LedgerTokenId>>;
}
