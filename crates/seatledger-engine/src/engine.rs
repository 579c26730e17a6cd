//! Engine facade wiring every component over shared collaborators.

use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use rust_decimal::Decimal;
use seatledger_ledger::{LedgerClient, MetadataPublisher};
use seatledger_store::{BuyerDirectory, EventCatalog, SeatStore, TicketStore};
use seatledger_types::{
    AdmissionOutcome, CancellationOutcome, Clock, EngineConfig, EntryVerdict, EventId,
    LedgerTokenId, ReleaseOutcome, Result, SeatAssignment, SeatId, Ticket, TicketId, TxHash,
    UserId,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::entry::EntryReconciler;
use crate::holds::SeatHolds;
use crate::issuance::IssuanceOrchestrator;
use crate::reconcile::{MintReconciler, ReconciliationReport};
use crate::reopen::{ReopenReport, ReopenScheduler};
use crate::sweep::{HoldSweeper, SweepReport};

/// External collaborators the engine runs against.
#[derive(Clone)]
pub struct EngineDeps {
    pub seats: Arc<dyn SeatStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub buyers: Arc<dyn BuyerDirectory>,
    pub catalog: Arc<dyn EventCatalog>,
    pub ledger: Arc<dyn LedgerClient>,
    pub publisher: Arc<dyn MetadataPublisher>,
    pub clock: Arc<dyn Clock>,
}

/// One handle over the hold state machine, issuance saga, cancellation and
/// reopen job, entry reconciler and orphan scan.
#[derive(Clone)]
pub struct SeatLedgerEngine {
    config: EngineConfig,
    holds: SeatHolds,
    issuance: IssuanceOrchestrator,
    reopen: ReopenScheduler,
    entry: EntryReconciler,
    sweeper: HoldSweeper,
    reconciler: MintReconciler,
}

impl SeatLedgerEngine {
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(
        config: EngineConfig,
        deps: EngineDeps,
        identity_verifier: Option<VerifyingKey>,
    ) -> Result<Self> {
        config.validate()?;

        let holds = SeatHolds::new(deps.seats, deps.clock);
        let issuance = IssuanceOrchestrator::new(
            holds.clone(),
            deps.tickets.clone(),
            deps.buyers.clone(),
            deps.catalog,
            deps.ledger.clone(),
            deps.publisher,
            config.clone(),
        );
        let reopen = ReopenScheduler::new(
            holds.clone(),
            deps.tickets.clone(),
            deps.ledger.clone(),
            config.clone(),
        );
        let entry = EntryReconciler::new(
            deps.tickets.clone(),
            deps.buyers,
            deps.ledger.clone(),
            config.clone(),
            identity_verifier,
        );
        let sweeper = HoldSweeper::new(holds.clone(), config.clone());
        let reconciler = MintReconciler::new(deps.tickets, deps.ledger);

        tracing::info!(
            hold_ttl_secs = config.hold_ttl_secs,
            reopen_interval_secs = config.reopen_interval_secs,
            enforce_identity = config.enforce_identity_verification,
            single_ticket_per_event = config.enforce_single_ticket_per_event,
            "Engine initialized"
        );
        Ok(Self {
            config,
            holds,
            issuance,
            reopen,
            entry,
            sweeper,
            reconciler,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current stored row of a seat.
    pub async fn seat(&self, event_id: EventId, seat_id: &SeatId) -> Result<SeatAssignment> {
        self.holds.load(event_id, seat_id).await
    }

    /// Hold with the configured default TTL.
    pub async fn acquire_hold(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        actor: UserId,
    ) -> Result<SeatAssignment> {
        self.holds
            .acquire_hold(event_id, seat_id, actor, self.config.hold_ttl())
            .await
    }

    pub async fn acquire_hold_for(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        actor: UserId,
        ttl: Duration,
    ) -> Result<SeatAssignment> {
        self.holds.acquire_hold(event_id, seat_id, actor, ttl).await
    }

    pub async fn release_hold(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        actor: UserId,
    ) -> Result<ReleaseOutcome> {
        self.holds.release_hold(event_id, seat_id, actor).await
    }

    pub async fn issue_ticket(
        &self,
        event_id: EventId,
        seat_id: &SeatId,
        buyer: UserId,
        price: Decimal,
    ) -> Result<Ticket> {
        self.issuance
            .issue_ticket(event_id, seat_id, buyer, price)
            .await
    }

    pub async fn cancel_ticket(
        &self,
        ticket_id: TicketId,
        seat_id: &SeatId,
        token_id: LedgerTokenId,
    ) -> Result<CancellationOutcome> {
        self.reopen.cancel_ticket(ticket_id, seat_id, token_id).await
    }

    pub async fn run_reopen_once(&self) -> Result<ReopenReport> {
        self.reopen.run_reopen_once().await
    }

    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        self.sweeper.sweep_expired().await
    }

    pub async fn verify_for_entry(
        &self,
        token_id: LedgerTokenId,
        buyer: UserId,
    ) -> Result<EntryVerdict> {
        self.entry.verify_for_entry(token_id, buyer).await
    }

    pub async fn admit(&self, token_id: LedgerTokenId, buyer: UserId) -> Result<AdmissionOutcome> {
        self.entry.admit(token_id, buyer).await
    }

    pub async fn register_identity(&self, token_id: LedgerTokenId, buyer: UserId) -> Result<TxHash> {
        self.entry.register_identity(token_id, buyer).await
    }

    pub async fn reconcile_event(&self, event_id: EventId) -> Result<ReconciliationReport> {
        self.reconciler.reconcile_event(event_id).await
    }

    /// Spawn the reopen job and, if enabled, the hold sweep. Both stop when
    /// `shutdown` flips to `true`.
    #[must_use]
    pub fn spawn_background(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.reopen.clone().run(shutdown.clone())),
            tokio::spawn(self.sweeper.clone().run(shutdown.clone())),
        ]
    }
}
