//! Orphan-mint detection.
//!
//! A mint whose ticket row failed to persist leaves a token with no
//! relational record. This scan lists such tokens (and rows whose token
//! the ledger does not know) for manual follow-up. It never writes to
//! either side.

use std::collections::BTreeSet;
use std::sync::Arc;

use seatledger_ledger::LedgerClient;
use seatledger_store::TicketStore;
use seatledger_types::{EventId, LedgerTokenId, Result, SeatLedgerError, TicketId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub event_id: EventId,
    /// Tokens the ledger has minted for the event.
    pub ledger_tokens: usize,
    /// Minted tokens with no ticket row.
    pub orphaned_tokens: Vec<LedgerTokenId>,
    /// Ticket rows whose token the ledger does not list.
    pub missing_on_ledger: Vec<TicketId>,
}

impl ReconciliationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned_tokens.is_empty() && self.missing_on_ledger.is_empty()
    }
}

#[derive(Clone)]
pub struct MintReconciler {
    tickets: Arc<dyn TicketStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl MintReconciler {
    #[must_use]
    pub fn new(tickets: Arc<dyn TicketStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { tickets, ledger }
    }

    /// Compare the ledger's mints for `event_id` with the ticket rows.
    pub async fn reconcile_event(&self, event_id: EventId) -> Result<ReconciliationReport> {
        let minted: BTreeSet<LedgerTokenId> = self
            .ledger
            .minted_tokens(event_id)
            .await
            .map_err(SeatLedgerError::Ledger)?
            .into_iter()
            .collect();
        let rows = self.tickets.tickets_for_event(event_id).await?;

        let recorded: BTreeSet<LedgerTokenId> =
            rows.iter().filter_map(|t| t.ledger_token_id).collect();
        let orphaned_tokens: Vec<_> = minted.difference(&recorded).copied().collect();
        let missing_on_ledger: Vec<_> = rows
            .iter()
            .filter(|t| t.ledger_token_id.is_none_or(|token| !minted.contains(&token)))
            .map(|t| t.ticket_id)
            .collect();

        let report = ReconciliationReport {
            event_id,
            ledger_tokens: minted.len(),
            orphaned_tokens,
            missing_on_ledger,
        };
        if report.is_clean() {
            tracing::debug!(%event_id, tokens = report.ledger_tokens, "Event reconciled");
        } else {
            tracing::error!(
                alert = "orphaned_mint",
                %event_id,
                orphaned = ?report.orphaned_tokens,
                missing_on_ledger = ?report.missing_on_ledger,
                "Ledger and ticket store diverge"
            );
        }
        Ok(report)
    }
}
