//! # SeatAssignment: the per-(event, seat) sale state
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────────┐  acquire   ┌──────┐  checkout  ┌──────┐
//!   │ AVAILABLE ├───────────▶│ HOLD ├───────────▶│ SOLD │
//!   └─────▲─────┘            └──┬───┘            └──┬───┘
//!         │  release / expiry   │                   │
//!         ├─────────────────────┘                   │
//!         │        cancellation reopen / mint fail  │
//!         └─────────────────────────────────────────┘
//! ```
//!
//! Expiry is advisory: a `HOLD` whose `hold_expires_at` has passed is
//! *logically* available even though the stored status still reads `HOLD`.
//! Every transition is applied by a conditional write keyed on the full
//! previously observed row, so two writers observing the same row cannot
//! both succeed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, SeatId, SeatLedgerError, UserId};

/// Stored sale status of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    /// Open for sale.
    Available,
    /// Claimed by one actor during checkout, until `hold_expires_at`.
    Hold,
    /// Ticket issued. Terminal except through cancellation.
    Sold,
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sold => write!(f, "SOLD"),
        }
    }
}

/// Composite key of a seat row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SeatKey {
    pub event_id: EventId,
    pub seat_id: SeatId,
}

impl SeatKey {
    #[must_use]
    pub fn new(event_id: EventId, seat_id: SeatId) -> Self {
        Self { event_id, seat_id }
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.seat_id)
    }
}

/// Durable sale state of one seat for one event.
///
/// Provisioned once per event×seat by the catalog collaborator and never
/// created or destroyed by this engine, only transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub status: SeatStatus,
    /// Actor holding the seat (HOLD) or the buyer it was sold to (SOLD).
    pub holding_actor_id: Option<UserId>,
    /// Hold deadline; set only while `status == Hold`.
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl SeatAssignment {
    /// A freshly provisioned, unsold seat.
    #[must_use]
    pub fn available(event_id: EventId, seat_id: SeatId) -> Self {
        Self {
            event_id,
            seat_id,
            status: SeatStatus::Available,
            holding_actor_id: None,
            hold_expires_at: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> SeatKey {
        SeatKey::new(self.event_id, self.seat_id.clone())
    }

    /// `true` if this is a HOLD whose deadline has passed.
    ///
    /// A HOLD row without a deadline violates the seat invariants; it is
    /// treated as expired so the seat can never be stuck.
    #[must_use]
    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Hold && self.hold_expires_at.is_none_or(|at| at < now)
    }

    /// Status as every reader must interpret it at `now`.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> SeatStatus {
        if self.is_hold_expired(now) {
            SeatStatus::Available
        } else {
            self.status
        }
    }

    /// `true` if `actor` holds this seat and the hold is still live at `now`.
    #[must_use]
    pub fn is_held_by(&self, actor: UserId, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Hold
            && self.holding_actor_id == Some(actor)
            && !self.is_hold_expired(now)
    }

    /// `true` if the seat is sold to `buyer`.
    #[must_use]
    pub fn is_sold_to(&self, buyer: UserId) -> bool {
        self.status == SeatStatus::Sold && self.holding_actor_id == Some(buyer)
    }

    /// The row after `actor` acquires a hold until `expires_at`.
    #[must_use]
    pub fn held_by(&self, actor: UserId, expires_at: DateTime<Utc>) -> Self {
        Self {
            status: SeatStatus::Hold,
            holding_actor_id: Some(actor),
            hold_expires_at: Some(expires_at),
            ..self.clone()
        }
    }

    /// The row after the hold is converted into a sale to `buyer`.
    #[must_use]
    pub fn sold_to(&self, buyer: UserId) -> Self {
        Self {
            status: SeatStatus::Sold,
            holding_actor_id: Some(buyer),
            hold_expires_at: None,
            ..self.clone()
        }
    }

    /// The row after the seat returns to sale.
    #[must_use]
    pub fn released(&self) -> Self {
        Self::available(self.event_id, self.seat_id.clone())
    }

    /// Check the structural invariants of a stored row.
    ///
    /// # Errors
    /// Returns [`SeatLedgerError::SeatInvariantViolation`] when
    /// - AVAILABLE carries a holder or deadline
    /// - HOLD lacks a holder or deadline
    /// - SOLD lacks a buyer
    pub fn check_invariants(&self) -> crate::Result<()> {
        let violation = match self.status {
            SeatStatus::Available
                if self.holding_actor_id.is_some() || self.hold_expires_at.is_some() =>
            {
                Some("AVAILABLE seat carries hold metadata")
            }
            SeatStatus::Hold if self.holding_actor_id.is_none() => Some("HOLD without holder"),
            SeatStatus::Hold if self.hold_expires_at.is_none() => Some("HOLD without deadline"),
            SeatStatus::Sold if self.holding_actor_id.is_none() => Some("SOLD without buyer"),
            _ => None,
        };
        match violation {
            Some(reason) => Err(SeatLedgerError::SeatInvariantViolation {
                reason: format!("{}: {reason}", self.key()),
            }),
            None => Ok(()),
        }
    }
}

/// Result of a successful `release_hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseOutcome {
    /// The caller's hold was removed and the seat is AVAILABLE again.
    Released,
    /// The seat was already (logically) available; nothing changed.
    AlreadyAvailable,
}
