//! Ticket issuance saga.
//!
//! ```text
//!   seat CAS ──▶ publish metadata ──▶ mint ──▶ persist ticket
//!      │               │                │            │
//!      │ fail          │ fail           │ fail       │ fail
//!      ▼               ▼                ▼            ▼
//!   HoldExpired    restore HOLD     delete doc   PersistenceAfterMintFailed
//!   OrStolen       MetadataPublish  seat → AVAIL (seat stays SOLD, alert)
//!                  Failed           MintFailed
//! ```
//!
//! Every step before the mint is cheap to undo. The mint is the single
//! point of no return; persistence happens only after it succeeds.

use std::sync::Arc;

use rust_decimal::Decimal;
use seatledger_ledger::{LedgerClient, MetadataPublisher};
use seatledger_store::{BuyerDirectory, EventCatalog, TicketStore};
use seatledger_types::{
    EngineConfig, EventId, MintRequest, Result, SeatId, SeatLedgerError, Ticket, TicketId,
    TicketMetadata, UserId, WalletAddress,
};

use crate::holds::{SaleTransition, SeatHolds};

/// Couples relational persistence with the ledger mint.
#[derive(Clone)]
pub struct IssuanceOrchestrator {
    holds: SeatHolds,
    tickets: Arc<dyn TicketStore>,
    buyers: Arc<dyn BuyerDirectory>,
    catalog: Arc<dyn EventCatalog>,
    ledger: Arc<dyn LedgerClient>,
    publisher: Arc<dyn MetadataPublisher>,
    config: EngineConfig,
}

impl IssuanceOrchestrator {
    #[must_use]
    pub fn new(
        holds: SeatHolds,
        tickets: Arc<dyn TicketStore>,
        buyers: Arc<dyn BuyerDirectory>,
        catalog: Arc<dyn EventCatalog>,
        ledger: Arc<dyn LedgerClient>,
        publisher: Arc<dyn MetadataPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            holds,
            tickets,
            buyers,
            catalog,
            ledger,
            publisher,
            config,
        }
    }

    /// Turn `buyer`'s live hold on a seat into a minted, persisted ticket.
    ///
    /// Payment for `price` is a precondition confirmed by the caller.
    ///
    /// # Errors
    /// - `InvalidRequest` for a non-positive price
    /// - `BuyerNotRegistered` if the buyer has no wallet
    /// - `DuplicateMint` if the buyer already holds a ticket for the event
    /// - `HoldExpiredOrStolen` if the hold is no longer the buyer's
    /// - `MetadataPublishFailed` (hold restored), `MintFailed` (seat returned
    ///   to sale), both with no ticket row
    /// - `PersistenceAfterMintFailed`: fatal, the seat stays SOLD
    pub async fn issue_ticket(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        buyer: UserId,
        price: Decimal,
    ) -> Result<Ticket> {
        if price <= Decimal::ZERO {
            return Err(SeatLedgerError::InvalidRequest {
                reason: format!("ticket price must be positive, got {price}"),
            });
        }

        let wallet = self
            .buyers
            .wallet_of(buyer)
            .await
            .map_err(SeatLedgerError::Directory)?
            .ok_or(SeatLedgerError::BuyerNotRegistered(buyer))?;

        if self.config.enforce_single_ticket_per_event
            && self
                .ledger
                .has_minted_for_event(&wallet, event_id)
                .await
                .map_err(SeatLedgerError::Ledger)?
        {
            tracing::warn!(%event_id, buyer = %buyer, wallet = %wallet.short(), "Duplicate mint refused");
            return Err(SeatLedgerError::DuplicateMint {
                buyer_id: buyer,
                event_id,
            });
        }

        // 1. Re-validate the hold and take the seat.
        let sale = self.holds.finalize_sale(event_id, seat_id, buyer).await?;

        // 2. Publish the ticket document.
        let metadata_uri = match self.publish_document(event_id, seat_id, buyer, &wallet, price).await
        {
            Ok(uri) => uri,
            Err(reason) => {
                if let Err(e) = self.holds.restore_hold(&sale).await {
                    tracing::error!(seat = %sale.sold.key(), error = %e, "Failed to restore hold after metadata failure");
                }
                return Err(SeatLedgerError::MetadataPublishFailed { reason });
            }
        };

        // 3. Mint. Point of no return on success.
        let request = MintRequest {
            owner: wallet.clone(),
            event_id,
            seat_id: seat_id.clone(),
            metadata_uri: metadata_uri.clone(),
            price,
        };
        let receipt = match self.ledger.mint(&request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    %event_id,
                    %seat_id,
                    buyer = %buyer,
                    wallet = %wallet.short(),
                    %price,
                    retryable = e.retryable,
                    error = %e,
                    "Mint failed; compensating"
                );
                self.compensate_mint_failure(&sale, &metadata_uri).await;
                return Err(SeatLedgerError::MintFailed { reason: e.message });
            }
        };

        // 4. Persist.
        let ticket = Ticket {
            ticket_id: TicketId::new(),
            event_id,
            seat_id: seat_id.clone(),
            buyer_id: buyer,
            ledger_token_id: Some(receipt.token_id),
            ledger_tx_hash: receipt.tx_hash.clone(),
            metadata_uri,
            purchase_price: price,
            issued_at: self.holds.now(),
            is_used: false,
            cancelled_at: None,
            reopen_at: None,
            reopened_at: None,
            reopen_failures: 0,
            reopen_retry_at: None,
        };
        if let Err(e) = self.tickets.insert(ticket.clone()).await {
            tracing::error!(
                alert = "orphaned_mint",
                %event_id,
                %seat_id,
                buyer = %buyer,
                %price,
                token_id = %receipt.token_id,
                tx_hash = %receipt.tx_hash,
                error = %e,
                "Ticket persistence failed after a successful mint"
            );
            return Err(SeatLedgerError::PersistenceAfterMintFailed {
                token_id: receipt.token_id,
                tx_hash: receipt.tx_hash,
                reason: e.to_string(),
            });
        }

        tracing::info!(
            ticket_id = %ticket.ticket_id,
            %event_id,
            %seat_id,
            buyer = %buyer,
            %price,
            token_id = %receipt.token_id,
            tx_hash = %ticket.ledger_tx_hash,
            "Ticket issued"
        );
        Ok(ticket)
    }

    /// Build the document and publish it, retrying up to the configured
    /// number of attempts. Returns the last failure reason.
    async fn publish_document(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        buyer: UserId,
        wallet: &WalletAddress,
        price: Decimal,
    ) -> std::result::Result<String, String> {
        let title = self
            .catalog
            .event_title(event_id)
            .await
            .map_err(|e| format!("catalog lookup failed: {e}"))?
            .unwrap_or_else(|| format!("Event {event_id}"));
        let holder = self
            .buyers
            .display_name(buyer)
            .await
            .map_err(|e| format!("directory lookup failed: {e}"))?
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| wallet.short().to_string());
        let document = TicketMetadata::for_ticket(&title, seat_id, &holder, wallet, price);

        let attempts = self.config.metadata_publish_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.publisher.publish(&document).await {
                Ok(uri) => return Ok(uri),
                Err(e) => {
                    tracing::warn!(%event_id, %seat_id, attempt, attempts, error = %e, "Metadata publish failed");
                    last_error = e.message;
                }
            }
        }
        Err(last_error)
    }

    /// Undo a sale whose mint failed: delete the document, then return the
    /// seat to sale. Sub-failures are logged and swallowed.
    async fn compensate_mint_failure(&self, sale: &SaleTransition, metadata_uri: &str) {
        if let Err(e) = self.publisher.delete(metadata_uri).await {
            tracing::warn!(uri = %metadata_uri, error = %e, "Metadata delete failed during compensation");
        }
        if let Err(e) = self.holds.revert_sale(sale).await {
            tracing::error!(seat = %sale.sold.key(), error = %e, "Failed to revert seat after mint failure");
        }
    }
}
