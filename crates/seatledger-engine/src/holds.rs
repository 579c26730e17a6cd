//! Seat hold state machine.
//!
//! All transitions read the current row, decide against the *effective*
//! status at `now`, and apply the result with a single conditional write.
//! An expired hold is reclaimed through the same path as a fresh
//! acquisition, so there is no separate expiry race to close.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use seatledger_store::SeatStore;
use seatledger_types::{
    Clock, EventId, ReleaseOutcome, Result, SeatAssignment, SeatId, SeatKey, SeatLedgerError,
    SeatStatus, UserId,
};

/// Upper bound on re-reads after a lost CAS in paths that retry.
const MAX_CAS_RETRIES: usize = 3;

/// A completed `HOLD → SOLD` transition, kept so the issuance saga can
/// compensate against the exact rows it wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTransition {
    pub held: SeatAssignment,
    pub sold: SeatAssignment,
}

/// Seat transitions over a [`SeatStore`].
#[derive(Clone)]
pub struct SeatHolds {
    store: Arc<dyn SeatStore>,
    clock: Arc<dyn Clock>,
}

impl SeatHolds {
    #[must_use]
    pub fn new(store: Arc<dyn SeatStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SeatStore> {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current row, or `SeatNotFound`.
    pub async fn load(&self, event_id: EventId, seat_id: &SeatId) -> Result<SeatAssignment> {
        let key = SeatKey::new(event_id, seat_id.clone());
        self.store
            .get(&key)
            .await?
            .ok_or_else(|| SeatLedgerError::SeatNotFound {
                event_id,
                seat_id: seat_id.clone(),
            })
    }

    /// Claim an AVAILABLE (or lapsed HOLD) seat for `actor` until `now + ttl`.
    ///
    /// # Errors
    /// - `SeatUnavailable` if the seat is held (live) or sold, or if another
    ///   writer won the conditional write
    /// - `SeatNotFound` if the seat was never provisioned
    pub async fn acquire_hold(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        actor: UserId,
        ttl: Duration,
    ) -> Result<SeatAssignment> {
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or_else(|| SeatLedgerError::InvalidRequest {
                reason: format!("hold ttl must be positive, got {ttl:?}"),
            })?;

        let now = self.now();
        let current = self.load(event_id, seat_id).await?;
        let status = current.effective_status(now);
        if status != SeatStatus::Available {
            tracing::debug!(
                seat = %current.key(),
                actor = %actor,
                %status,
                "Hold refused: seat not available"
            );
            return Err(SeatLedgerError::SeatUnavailable {
                event_id,
                seat_id: seat_id.clone(),
                status,
            });
        }

        let reclaimed = current.status == SeatStatus::Hold;
        let next = current.held_by(actor, now + ttl);
        if !self.store.compare_and_swap(&current, &next).await? {
            let status = match self.store.get(&current.key()).await? {
                Some(row) => row.effective_status(self.now()),
                None => SeatStatus::Hold,
            };
            tracing::debug!(
                seat = %current.key(),
                actor = %actor,
                "Hold lost to a concurrent writer"
            );
            return Err(SeatLedgerError::SeatUnavailable {
                event_id,
                seat_id: seat_id.clone(),
                status,
            });
        }

        tracing::info!(
            seat = %next.key(),
            actor = %actor,
            expires_at = ?next.hold_expires_at,
            reclaimed,
            "Hold acquired"
        );
        Ok(next)
    }

    /// Give up `actor`'s hold.
    ///
    /// Releasing a seat that is already (logically) available is a no-op
    /// success.
    ///
    /// # Errors
    /// `Conflict` if the seat is SOLD or under another actor's live hold.
    pub async fn release_hold(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        actor: UserId,
    ) -> Result<ReleaseOutcome> {
        for _ in 0..MAX_CAS_RETRIES {
            let now = self.now();
            let current = self.load(event_id, seat_id).await?;
            match current.status {
                SeatStatus::Available => return Ok(ReleaseOutcome::AlreadyAvailable),
                SeatStatus::Sold => {
                    return Err(SeatLedgerError::Conflict {
                        reason: format!("{} is SOLD and cannot be released", current.key()),
                    });
                }
                SeatStatus::Hold if current.holding_actor_id != Some(actor) => {
                    if current.is_hold_expired(now) {
                        return Ok(ReleaseOutcome::AlreadyAvailable);
                    }
                    return Err(SeatLedgerError::Conflict {
                        reason: format!("{} is held by another actor", current.key()),
                    });
                }
                SeatStatus::Hold => {
                    if self
                        .store
                        .compare_and_swap(&current, &current.released())
                        .await?
                    {
                        tracing::info!(seat = %current.key(), actor = %actor, "Hold released");
                        return Ok(ReleaseOutcome::Released);
                    }
                }
            }
        }
        Err(SeatLedgerError::Conflict {
            reason: format!("{event_id}/{seat_id} kept changing during release"),
        })
    }

    /// `HOLD(by buyer, unexpired) → SOLD`, re-validated against the store.
    ///
    /// # Errors
    /// `HoldExpiredOrStolen` if the buyer no longer holds a live hold or a
    /// concurrent writer changed the row.
    pub async fn finalize_sale(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        buyer: UserId,
    ) -> Result<SaleTransition> {
        let stolen = || SeatLedgerError::HoldExpiredOrStolen {
            event_id,
            seat_id: seat_id.clone(),
            buyer_id: buyer,
        };

        let held = self.load(event_id, seat_id).await?;
        if !held.is_held_by(buyer, self.now()) {
            tracing::warn!(
                seat = %held.key(),
                buyer = %buyer,
                status = %held.status,
                holder = ?held.holding_actor_id,
                expires_at = ?held.hold_expires_at,
                "Checkout refused: hold expired or stolen"
            );
            return Err(stolen());
        }
        let sold = held.sold_to(buyer);
        if !self.store.compare_and_swap(&held, &sold).await? {
            tracing::warn!(seat = %held.key(), buyer = %buyer, "Checkout lost a concurrent write");
            return Err(stolen());
        }
        Ok(SaleTransition { held, sold })
    }

    /// Compensation: `SOLD → AVAILABLE` after a failed mint.
    pub async fn revert_sale(&self, sale: &SaleTransition) -> Result<()> {
        self.compensate(&sale.sold, &sale.sold.released(), "sale reverted")
            .await
    }

    /// Compensation: `SOLD → HOLD` (the buyer's original hold) after a
    /// failed metadata publish.
    pub async fn restore_hold(&self, sale: &SaleTransition) -> Result<()> {
        self.compensate(&sale.sold, &sale.held, "hold restored")
            .await
    }

    async fn compensate(
        &self,
        from: &SeatAssignment,
        to: &SeatAssignment,
        what: &'static str,
    ) -> Result<()> {
        if self.store.compare_and_swap(from, to).await? {
            tracing::info!(seat = %from.key(), status = %to.status, "Seat {what}");
            Ok(())
        } else {
            Err(SeatLedgerError::Conflict {
                reason: format!("{}: {what} failed, row changed underneath", from.key()),
            })
        }
    }

    /// `SOLD(to buyer) → AVAILABLE` after a cancellation's cooling-off.
    ///
    /// Returns `Ok(false)` if the seat is not sold to `buyer` any more
    /// (already reopened, or resold), which makes reruns harmless.
    pub async fn reopen_seat(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        buyer: UserId,
    ) -> Result<bool> {
        let current = self.load(event_id, seat_id).await?;
        if !current.is_sold_to(buyer) {
            if current.status == SeatStatus::Sold {
                tracing::warn!(
                    seat = %current.key(),
                    cancelled_buyer = %buyer,
                    holder = ?current.holding_actor_id,
                    "Reopen skipped: seat sold to a different buyer"
                );
            }
            return Ok(false);
        }
        if !self
            .store
            .compare_and_swap(&current, &current.released())
            .await?
        {
            return Err(SeatLedgerError::Conflict {
                reason: format!("{}: reopen lost a concurrent write", current.key()),
            });
        }
        tracing::info!(seat = %current.key(), buyer = %buyer, "Seat reopened for sale");
        Ok(true)
    }

    /// Return a lapsed hold to AVAILABLE. `Ok(false)` if the row changed
    /// since it was observed or the hold is still live.
    pub async fn reclaim_expired(&self, observed: &SeatAssignment) -> Result<bool> {
        if !observed.is_hold_expired(self.now()) {
            return Ok(false);
        }
        self.store
            .compare_and_swap(observed, &observed.released())
            .await
    }
}
