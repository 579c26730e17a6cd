//! Relational ticket record and its cancellation outcome.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EventId, LedgerTokenId, SeatId, SeatKey, TicketId, TxHash, UserId};

/// A ticket of record, written only after a successful ledger mint.
///
/// The relational row is the authority for *who bought what seat*; the
/// ledger is the authority for usage and transferability. Both are compared
/// at the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub buyer_id: UserId,
    /// Ledger token; absent only for rows imported before mint completed.
    pub ledger_token_id: Option<LedgerTokenId>,
    pub ledger_tx_hash: TxHash,
    pub metadata_uri: String,
    pub purchase_price: Decimal,
    pub issued_at: DateTime<Utc>,
    pub is_used: bool,
    /// Set together with `reopen_at` in one write.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Ledger-assigned reopen time, epoch seconds.
    pub reopen_at: Option<i64>,
    /// Claim marker set by the reopen job before it acts on the ticket.
    pub reopened_at: Option<DateTime<Utc>>,
    /// Reopen attempts that failed and were released.
    #[serde(default)]
    pub reopen_failures: u32,
    /// Earliest epoch second the next reopen attempt may run.
    #[serde(default)]
    pub reopen_retry_at: Option<i64>,
}

impl Ticket {
    #[must_use]
    pub fn seat_key(&self) -> SeatKey {
        SeatKey::new(self.event_id, self.seat_id.clone())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Cancelled, past its reopen time and any retry backoff, and not yet
    /// claimed by a reopen run.
    #[must_use]
    pub fn is_due_for_reopen(&self, now_secs: i64) -> bool {
        self.cancelled_at.is_some()
            && self.reopened_at.is_none()
            && self.reopen_at.is_some_and(|at| at <= now_secs)
            && self.reopen_retry_at.is_none_or(|at| at <= now_secs)
    }

    /// Test fixture: a freshly issued, unused, uncancelled ticket.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn dummy(event_id: EventId, seat_id: SeatId, buyer_id: UserId, token: u64) -> Self {
        Self {
            ticket_id: TicketId::new(),
            event_id,
            seat_id,
            buyer_id,
            ledger_token_id: Some(LedgerTokenId(token)),
            ledger_tx_hash: TxHash(format!("0x{token:064x}")),
            metadata_uri: format!("mem://tickets/{token}.json"),
            purchase_price: Decimal::new(5000, 2),
            issued_at: Utc::now(),
            is_used: false,
            cancelled_at: None,
            reopen_at: None,
            reopened_at: None,
            reopen_failures: 0,
            reopen_retry_at: None,
        }
    }
}

/// Result of a successful `cancel_ticket` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationOutcome {
    /// The ledger recorded the cancellation; the seat reopens at `reopen_at`.
    Cancelled { reopen_at: i64 },
    /// The ticket was cancelled before; nothing changed.
    AlreadyCancelled { reopen_at: Option<i64> },
}

impl CancellationOutcome {
    #[must_use]
    pub fn reopen_at(&self) -> Option<i64> {
        match self {
            Self::Cancelled { reopen_at } => Some(*reopen_at),
            Self::AlreadyCancelled { reopen_at } => *reopen_at,
        }
    }
}
