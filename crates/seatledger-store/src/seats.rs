//! Seat state store.
//!
//! Every transition of a [`SeatAssignment`] goes through
//! [`SeatStore::compare_and_swap`]: the write lands only if the stored row
//! still equals the row the caller observed. Two writers racing from the
//! same observation therefore cannot both succeed, whatever the
//! interleaving.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatledger_types::{
    EventId, Result, SeatAssignment, SeatId, SeatKey, SeatLedgerError, SeatStatus,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Durable per-seat sale state.
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Current row for `key`, if provisioned.
    async fn get(&self, key: &SeatKey) -> Result<Option<SeatAssignment>>;

    /// Replace the row with `next` only if it still equals `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    async fn compare_and_swap(
        &self,
        expected: &SeatAssignment,
        next: &SeatAssignment,
    ) -> Result<bool>;

    /// Up to `limit` HOLD rows whose deadline is before `now`.
    async fn expired_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SeatAssignment>>;
}

/// In-memory [`SeatStore`].
#[derive(Debug, Default)]
pub struct InMemorySeatStore {
    rows: RwLock<HashMap<SeatKey, SeatAssignment>>,
}

impl InMemorySeatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision AVAILABLE rows for an event. Existing rows are left as-is.
    ///
    /// Returns how many rows were created.
    pub async fn provision(
        &self,
        event_id: EventId,
        seats: impl IntoIterator<Item = SeatId>,
    ) -> usize {
        let mut rows = self.rows.write().await;
        let mut created = 0;
        for seat_id in seats {
            let key = SeatKey::new(event_id, seat_id.clone());
            rows.entry(key).or_insert_with(|| {
                created += 1;
                SeatAssignment::available(event_id, seat_id)
            });
        }
        debug!(%event_id, created, "Seats provisioned");
        created
    }

    /// Rows of one event, sorted by seat label.
    pub async fn seats_for_event(&self, event_id: EventId) -> Vec<SeatAssignment> {
        let rows = self.rows.read().await;
        let mut seats: Vec<_> = rows
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_id.cmp(&b.seat_id));
        seats
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Overwrite a row unconditionally. Fixture setup only.
    #[cfg(any(test, feature = "test-helpers"))]
    pub async fn force(&self, row: SeatAssignment) {
        self.rows.write().await.insert(row.key(), row);
    }
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn get(&self, key: &SeatKey) -> Result<Option<SeatAssignment>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: &SeatAssignment,
        next: &SeatAssignment,
    ) -> Result<bool> {
        if expected.key() != next.key() {
            return Err(SeatLedgerError::InvalidRequest {
                reason: format!("CAS across seats: {} -> {}", expected.key(), next.key()),
            });
        }
        next.check_invariants()?;

        let mut rows = self.rows.write().await;
        let Some(current) = rows.get_mut(&expected.key()) else {
            return Err(SeatLedgerError::SeatNotFound {
                event_id: expected.event_id,
                seat_id: expected.seat_id.clone(),
            });
        };
        if current != expected {
            return Ok(false);
        }
        *current = next.clone();
        Ok(true)
    }

    async fn expired_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SeatAssignment>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|s| s.status == SeatStatus::Hold && s.is_hold_expired(now))
            .take(limit)
            .cloned()
            .collect())
    }
}
