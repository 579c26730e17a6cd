//! Ticket store.
//!
//! Besides plain reads and inserts, the store exposes three conditional
//! writes, each of which succeeds for exactly one caller:
//!
//! - [`TicketStore::record_cancellation`] sets `cancelled_at` and
//!   `reopen_at` together, once.
//! - [`TicketStore::claim_reopen`] stamps `reopened_at` on a due ticket so
//!   overlapping reopen runs cannot both act on it.
//! - [`TicketStore::claim_usage`] flips `is_used` so simultaneous gate scans
//!   cannot both admit.
//!
//! Claims can be released when the follow-up ledger call fails. A released
//! reopen claim counts as a failure: the ticket backs off until its retry
//! time and sorts behind tickets that have never failed.

use std::collections::HashMap;
#[cfg(any(test, feature = "test-helpers"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatledger_types::{EventId, LedgerTokenId, Result, SeatLedgerError, Ticket, TicketId};
use tokio::sync::RwLock;

/// Relational ticket records.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket. Fails if the ticket id or ledger token is taken.
    async fn insert(&self, ticket: Ticket) -> Result<()>;

    async fn get(&self, ticket_id: TicketId) -> Result<Option<Ticket>>;

    async fn find_by_token(&self, token_id: LedgerTokenId) -> Result<Option<Ticket>>;

    /// Persist `cancelled_at` and `reopen_at` in one write.
    ///
    /// Returns `Ok(false)` if the ticket was already cancelled.
    async fn record_cancellation(
        &self,
        ticket_id: TicketId,
        cancelled_at: DateTime<Utc>,
        reopen_at: i64,
    ) -> Result<bool>;

    /// Cancelled tickets with `reopen_at <= now_secs`, no reopen claim and
    /// no pending retry backoff. Tickets with fewer failed attempts come
    /// first, then the earliest `reopen_at`.
    async fn due_for_reopen(&self, now_secs: i64, limit: usize) -> Result<Vec<Ticket>>;

    /// Stamp `reopened_at` if the ticket is still due. `Ok(false)` if
    /// another run claimed it first or it is not due.
    async fn claim_reopen(
        &self,
        ticket_id: TicketId,
        now_secs: i64,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clear a failed reopen claim, count the failure, and hold the ticket
    /// back until `retry_at` (epoch seconds).
    async fn release_reopen_claim(&self, ticket_id: TicketId, retry_at: i64) -> Result<()>;

    /// Flip `is_used` from `false` to `true`. `Ok(false)` if already used.
    async fn claim_usage(&self, ticket_id: TicketId) -> Result<bool>;

    /// Undo a usage claim whose ledger write failed.
    async fn release_usage_claim(&self, ticket_id: TicketId) -> Result<()>;

    async fn tickets_for_event(&self, event_id: EventId) -> Result<Vec<Ticket>>;
}

/// In-memory [`TicketStore`].
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
    by_token: RwLock<HashMap<LedgerTokenId, TicketId>>,
    #[cfg(any(test, feature = "test-helpers"))]
    fail_inserts: AtomicBool,
    #[cfg(any(test, feature = "test-helpers"))]
    fail_next_cancellation: AtomicBool,
}

impl InMemoryTicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }

    /// Make every subsequent `insert` fail until reset.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make the next `record_cancellation` fail.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_next_cancellation(&self) {
        self.fail_next_cancellation.store(true, Ordering::SeqCst);
    }

    /// Overwrite a row unconditionally. Fixture setup only.
    #[cfg(any(test, feature = "test-helpers"))]
    pub async fn force(&self, ticket: Ticket) {
        if let Some(token) = ticket.ledger_token_id {
            self.by_token.write().await.insert(token, ticket.ticket_id);
        }
        self.tickets.write().await.insert(ticket.ticket_id, ticket);
    }

    async fn update<F>(&self, ticket_id: TicketId, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut Ticket) -> bool + Send,
    {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or(SeatLedgerError::TicketNotFound(ticket_id))?;
        Ok(apply(ticket))
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<()> {
        #[cfg(any(test, feature = "test-helpers"))]
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(SeatLedgerError::Store("injected insert failure".into()));
        }

        // Lock order: tickets, then by_token.
        let mut tickets = self.tickets.write().await;
        let mut by_token = self.by_token.write().await;
        if tickets.contains_key(&ticket.ticket_id) {
            return Err(SeatLedgerError::Store(format!(
                "duplicate ticket id {}",
                ticket.ticket_id
            )));
        }
        if let Some(token) = ticket.ledger_token_id {
            if by_token.contains_key(&token) {
                return Err(SeatLedgerError::Store(format!(
                    "ledger {token} already bound to a ticket"
                )));
            }
            by_token.insert(token, ticket.ticket_id);
        }
        tickets.insert(ticket.ticket_id, ticket);
        Ok(())
    }

    async fn get(&self, ticket_id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.tickets.read().await.get(&ticket_id).cloned())
    }

    async fn find_by_token(&self, token_id: LedgerTokenId) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().await;
        let by_token = self.by_token.read().await;
        Ok(by_token
            .get(&token_id)
            .and_then(|id| tickets.get(id))
            .cloned())
    }

    async fn record_cancellation(
        &self,
        ticket_id: TicketId,
        cancelled_at: DateTime<Utc>,
        reopen_at: i64,
    ) -> Result<bool> {
        #[cfg(any(test, feature = "test-helpers"))]
        if self.fail_next_cancellation.swap(false, Ordering::SeqCst) {
            return Err(SeatLedgerError::Store("injected cancellation failure".into()));
        }

        self.update(ticket_id, |t| {
            if t.cancelled_at.is_some() {
                return false;
            }
            t.cancelled_at = Some(cancelled_at);
            t.reopen_at = Some(reopen_at);
            true
        })
        .await
    }

    async fn due_for_reopen(&self, now_secs: i64, limit: usize) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut due: Vec<_> = tickets
            .values()
            .filter(|t| t.is_due_for_reopen(now_secs))
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.reopen_failures, t.reopen_at, t.ticket_id));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_reopen(
        &self,
        ticket_id: TicketId,
        now_secs: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.update(ticket_id, |t| {
            if !t.is_due_for_reopen(now_secs) {
                return false;
            }
            t.reopened_at = Some(at);
            true
        })
        .await
    }

    async fn release_reopen_claim(&self, ticket_id: TicketId, retry_at: i64) -> Result<()> {
        self.update(ticket_id, |t| {
            t.reopened_at = None;
            t.reopen_failures = t.reopen_failures.saturating_add(1);
            t.reopen_retry_at = Some(retry_at);
            true
        })
        .await
        .map(|_| ())
    }

    async fn claim_usage(&self, ticket_id: TicketId) -> Result<bool> {
        self.update(ticket_id, |t| {
            if t.is_used {
                return false;
            }
            t.is_used = true;
            true
        })
        .await
    }

    async fn release_usage_claim(&self, ticket_id: TicketId) -> Result<()> {
        self.update(ticket_id, |t| {
            t.is_used = false;
            true
        })
        .await
        .map(|_| ())
    }

    async fn tickets_for_event(&self, event_id: EventId) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut out: Vec<_> = tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.ticket_id);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use seatledger_types::{SeatId, UserId};

    use super::*;

    fn ticket(token: u64) -> Ticket {
        Ticket::dummy(EventId::new(), SeatId::new("A-01"), UserId::new(), token)
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let store = InMemoryTicketStore::new();
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        assert_eq!(store.get(t.ticket_id).await.unwrap(), Some(t.clone()));
        assert_eq!(
            store.find_by_token(LedgerTokenId(1)).await.unwrap(),
            Some(t.clone())
        );
        assert!(store.find_by_token(LedgerTokenId(2)).await.unwrap().is_none());
        assert_eq!(store.tickets_for_event(t.event_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_token_rejected() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket(1)).await.unwrap();
        let err = store.insert(ticket(1)).await.unwrap_err();
        assert!(matches!(err, SeatLedgerError::Store(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn injected_insert_failure() {
        let store = InMemoryTicketStore::new();
        store.fail_inserts(true);
        assert!(store.insert(ticket(1)).await.is_err());
        assert!(store.is_empty().await);
        store.fail_inserts(false);
        assert!(store.insert(ticket(1)).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_recorded_once() {
        let store = InMemoryTicketStore::new();
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        let now = Utc::now();
        assert!(store.record_cancellation(t.ticket_id, now, 100).await.unwrap());
        assert!(!store.record_cancellation(t.ticket_id, now, 200).await.unwrap());
        let stored = store.get(t.ticket_id).await.unwrap().unwrap();
        assert_eq!(stored.reopen_at, Some(100));
        assert_eq!(stored.cancelled_at, Some(now));
    }

    #[tokio::test]
    async fn cancellation_of_unknown_ticket_errors() {
        let store = InMemoryTicketStore::new();
        let err = store
            .record_cancellation(TicketId::new(), Utc::now(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SeatLedgerError::TicketNotFound(_)));
    }

    #[tokio::test]
    async fn reopen_claim_lifecycle() {
        let store = InMemoryTicketStore::new();
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        store
            .record_cancellation(t.ticket_id, Utc::now(), 1_000)
            .await
            .unwrap();

        assert!(store.due_for_reopen(999, 10).await.unwrap().is_empty());
        assert_eq!(store.due_for_reopen(1_000, 10).await.unwrap().len(), 1);

        assert!(!store.claim_reopen(t.ticket_id, 999, Utc::now()).await.unwrap());
        assert!(store.claim_reopen(t.ticket_id, 1_000, Utc::now()).await.unwrap());
        assert!(!store.claim_reopen(t.ticket_id, 1_000, Utc::now()).await.unwrap());
        assert!(store.due_for_reopen(2_000, 10).await.unwrap().is_empty());

        store.release_reopen_claim(t.ticket_id, 2_060).await.unwrap();
        assert!(store.due_for_reopen(2_059, 10).await.unwrap().is_empty());
        let due = store.due_for_reopen(2_060, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].reopen_failures, 1);
    }

    #[tokio::test]
    async fn failed_tickets_sort_behind_fresh_ones() {
        let store = InMemoryTicketStore::new();
        let failing = ticket(1);
        let fresh = ticket(2);
        for (t, reopen_at) in [(&failing, 10), (&fresh, 20)] {
            store.insert(t.clone()).await.unwrap();
            store
                .record_cancellation(t.ticket_id, Utc::now(), reopen_at)
                .await
                .unwrap();
        }
        assert!(store.claim_reopen(failing.ticket_id, 100, Utc::now()).await.unwrap());
        store.release_reopen_claim(failing.ticket_id, 100).await.unwrap();

        let due = store.due_for_reopen(100, 1).await.unwrap();
        assert_eq!(due[0].ticket_id, fresh.ticket_id);
        assert_eq!(store.due_for_reopen(100, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_cancellation_failure_is_one_shot() {
        let store = InMemoryTicketStore::new();
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        store.fail_next_cancellation();
        let err = store
            .record_cancellation(t.ticket_id, Utc::now(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SeatLedgerError::Store(_)));
        assert!(!store.get(t.ticket_id).await.unwrap().unwrap().is_cancelled());
        assert!(store.record_cancellation(t.ticket_id, Utc::now(), 100).await.unwrap());
    }

    #[tokio::test]
    async fn due_for_reopen_respects_limit_and_order() {
        let store = InMemoryTicketStore::new();
        for (token, reopen_at) in [(1, 30), (2, 10), (3, 20)] {
            let t = ticket(token);
            store.insert(t.clone()).await.unwrap();
            store
                .record_cancellation(t.ticket_id, Utc::now(), reopen_at)
                .await
                .unwrap();
        }
        let due = store.due_for_reopen(100, 2).await.unwrap();
        let order: Vec<_> = due.iter().map(|t| t.reopen_at).collect();
        assert_eq!(order, vec![Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn usage_claim_and_release() {
        let store = InMemoryTicketStore::new();
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        assert!(store.claim_usage(t.ticket_id).await.unwrap());
        assert!(!store.claim_usage(t.ticket_id).await.unwrap());
        store.release_usage_claim(t.ticket_id).await.unwrap();
        assert!(store.claim_usage(t.ticket_id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_usage_claims_single_winner() {
        let store = Arc::new(InMemoryTicketStore::new());
        let t = ticket(1);
        store.insert(t.clone()).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = t.ticket_id;
            handles.push(tokio::spawn(async move { store.claim_usage(id).await.unwrap() }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
