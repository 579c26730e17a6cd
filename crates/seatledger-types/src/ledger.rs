//! Wire-level shapes exchanged with the ticket ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EventId, LedgerTokenId, SeatId, TxHash, WalletAddress};

/// Read-only projection of the ledger's own bookkeeping for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTicketView {
    pub owner: WalletAddress,
    pub is_used: bool,
    pub is_face_verified: bool,
    pub is_cancelled: bool,
    /// Ledger-assigned reopen time of a cancelled token, epoch seconds.
    #[serde(default)]
    pub reopen_at: Option<i64>,
    /// Mint time in epoch seconds; `0` means the token does not exist.
    pub issued_at: i64,
}

impl LedgerTicketView {
    #[must_use]
    pub fn exists(&self) -> bool {
        self.issued_at > 0
    }
}

/// Parameters of a mint call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Wallet the token is bound to. Tokens are non-transferable.
    pub owner: WalletAddress,
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub metadata_uri: String,
    pub price: Decimal,
}

/// What the ledger returns for a confirmed mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub tx_hash: TxHash,
    pub token_id: LedgerTokenId,
}
