//! Cancellation and the reopen job.
//!
//! Cancelling writes the ledger first and the ticket row second; the row's
//! `cancelled_at` and `reopen_at` land together. The reopen job then
//! returns each cancelled seat to sale once its cooling-off has passed,
//! claiming the ticket before acting so a rerun never reopens twice. A
//! ticket whose reopen fails backs off before it is retried, so a few
//! failing tickets cannot starve the rest of the batch.

use std::sync::Arc;

use seatledger_ledger::LedgerClient;
use seatledger_store::TicketStore;
use seatledger_types::{
    CancellationOutcome, EngineConfig, LedgerTicketView, LedgerTokenId, Result, SeatId,
    SeatLedgerError, Ticket, TicketId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::holds::SeatHolds;
use crate::jobs;

/// Counters of one reopen run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenReport {
    /// Tickets the query returned as due.
    pub due: usize,
    /// Seats returned to AVAILABLE.
    pub reopened: usize,
    /// Tickets claimed elsewhere, or whose seat no longer belonged to the
    /// cancelled buyer.
    pub skipped: usize,
    /// Tickets whose claim was released for a later run.
    pub failed: usize,
}

/// What happened to one due ticket.
enum ItemOutcome {
    Reopened,
    Skipped,
}

#[derive(Clone)]
pub struct ReopenScheduler {
    holds: SeatHolds,
    tickets: Arc<dyn TicketStore>,
    ledger: Arc<dyn LedgerClient>,
    config: EngineConfig,
}

impl ReopenScheduler {
    #[must_use]
    pub fn new(
        holds: SeatHolds,
        tickets: Arc<dyn TicketStore>,
        ledger: Arc<dyn LedgerClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            holds,
            tickets,
            ledger,
            config,
        }
    }

    /// Cancel an issued ticket, scheduling its seat to reopen.
    ///
    /// A repeated cancellation reports `AlreadyCancelled` without touching
    /// the ledger. If an earlier attempt cancelled on the ledger but failed
    /// to persist the row, a retry persists the ledger's reopen time.
    ///
    /// # Errors
    /// - `TicketNotFound`, or `TicketMismatch` if `seat_id`/`token_id` do not
    ///   belong to the ticket
    /// - `TicketAlreadyUsed` for an admitted ticket
    /// - `CancellationRejected` if the ledger refuses; the row is untouched
    pub async fn cancel_ticket(
        &self,
        ticket_id: TicketId,
        seat_id: &SeatId,
        token_id: LedgerTokenId,
    ) -> Result<CancellationOutcome> {
        let ticket = self
            .tickets
            .get(ticket_id)
            .await?
            .ok_or(SeatLedgerError::TicketNotFound(ticket_id))?;
        if &ticket.seat_id != seat_id {
            return Err(SeatLedgerError::TicketMismatch {
                ticket_id,
                reason: format!("ticket is for seat {}, not {seat_id}", ticket.seat_id),
            });
        }
        if ticket.ledger_token_id != Some(token_id) {
            return Err(SeatLedgerError::TicketMismatch {
                ticket_id,
                reason: format!("ticket is not bound to {token_id}"),
            });
        }
        if ticket.is_cancelled() {
            return Ok(CancellationOutcome::AlreadyCancelled {
                reopen_at: ticket.reopen_at,
            });
        }
        if ticket.is_used {
            return Err(SeatLedgerError::TicketAlreadyUsed(ticket_id));
        }

        let reopen_at = self.cancel_on_ledger(ticket_id, token_id).await?;

        let recorded = self
            .tickets
            .record_cancellation(ticket_id, self.holds.now(), reopen_at)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    %ticket_id,
                    %token_id,
                    reopen_at,
                    error = %e,
                    "Cancellation recorded on ledger but not persisted"
                );
            })?;
        if !recorded {
            // A concurrent cancel persisted first.
            let current = self.tickets.get(ticket_id).await?;
            return Ok(CancellationOutcome::AlreadyCancelled {
                reopen_at: current.and_then(|t| t.reopen_at),
            });
        }

        tracing::info!(%ticket_id, %seat_id, %token_id, reopen_at, "Ticket cancelled");
        Ok(CancellationOutcome::Cancelled { reopen_at })
    }

    /// Cancel on the ledger and return its reopen time. A rejection is
    /// accepted only if the ledger already holds the cancellation.
    async fn cancel_on_ledger(&self, ticket_id: TicketId, token_id: LedgerTokenId) -> Result<i64> {
        let rejection = match self.ledger.mark_cancelled(token_id).await {
            Ok(reopen_at) => return Ok(reopen_at),
            Err(e) => e,
        };
        match self.ledger.ticket_view(token_id).await {
            Ok(LedgerTicketView {
                is_cancelled: true,
                reopen_at: Some(reopen_at),
                ..
            }) => {
                tracing::info!(
                    %ticket_id,
                    %token_id,
                    reopen_at,
                    "Ledger already holds the cancellation; persisting its reopen time"
                );
                Ok(reopen_at)
            }
            _ => {
                tracing::warn!(%ticket_id, %token_id, error = %rejection, "Ledger rejected cancellation");
                Err(SeatLedgerError::CancellationRejected {
                    reason: rejection.message,
                })
            }
        }
    }

    /// One pass over the tickets due for reopening.
    ///
    /// Failures are isolated per ticket. A failed ticket is released with a
    /// retry time that doubles per failure, and sorts behind tickets that
    /// have not failed.
    ///
    /// # Errors
    /// Only if the due-ticket query itself fails.
    pub async fn run_reopen_once(&self) -> Result<ReopenReport> {
        let now = self.holds.now();
        let due = self
            .tickets
            .due_for_reopen(now.timestamp(), self.config.reopen_batch_limit)
            .await?;

        let mut report = ReopenReport {
            due: due.len(),
            ..ReopenReport::default()
        };
        for ticket in due {
            match self.reopen_one(&ticket).await {
                Ok(ItemOutcome::Reopened) => report.reopened += 1,
                Ok(ItemOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    let retry_at = now.timestamp()
                        + self.config.reopen_retry_delay_secs(ticket.reopen_failures);
                    tracing::warn!(
                        ticket_id = %ticket.ticket_id,
                        seat = %ticket.seat_key(),
                        failures = ticket.reopen_failures + 1,
                        retry_at,
                        error = %e,
                        "Reopen failed; will retry"
                    );
                    if let Err(e) = self
                        .tickets
                        .release_reopen_claim(ticket.ticket_id, retry_at)
                        .await
                    {
                        tracing::error!(ticket_id = %ticket.ticket_id, error = %e, "Failed to release reopen claim");
                    }
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                due = report.due,
                reopened = report.reopened,
                skipped = report.skipped,
                failed = report.failed,
                "Reopen run complete"
            );
        }
        Ok(report)
    }

    async fn reopen_one(&self, ticket: &Ticket) -> Result<ItemOutcome> {
        let now = self.holds.now();
        if !self
            .tickets
            .claim_reopen(ticket.ticket_id, now.timestamp(), now)
            .await?
        {
            return Ok(ItemOutcome::Skipped);
        }

        if let Some(token) = ticket.ledger_token_id {
            self.ledger
                .acknowledge_reopen(token)
                .await
                .map_err(SeatLedgerError::Ledger)?;
        }

        if self
            .holds
            .reopen_seat(ticket.event_id, &ticket.seat_id, ticket.buyer_id)
            .await?
        {
            Ok(ItemOutcome::Reopened)
        } else {
            Ok(ItemOutcome::Skipped)
        }
    }

    /// Run [`run_reopen_once`](Self::run_reopen_once) on the configured
    /// interval until `shutdown` fires.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let period = self.config.reopen_interval();
        let this = &self;
        jobs::run_every("reopen", period, shutdown, move || async move {
            if let Err(e) = this.run_reopen_once().await {
                tracing::error!(error = %e, "Reopen run failed");
            }
        })
        .await;
    }
}
