//! End-to-end tests over the full seat and ticket lifecycle.
//!
//! Every scenario runs the engine facade against the in-memory stores, the
//! simulated ledger and the in-memory metadata publisher, with a manual
//! clock driving hold expiry and cooling-off windows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ed25519_dalek::SigningKey;
use rust_decimal::Decimal;
use seatledger_engine::{EngineDeps, ReopenReport, SeatLedgerEngine};
use seatledger_ledger::{InMemoryMetadataPublisher, LedgerClient, LedgerOp, SimulatedLedger};
use seatledger_store::{
    InMemoryBuyerDirectory, InMemoryEventCatalog, InMemorySeatStore, InMemoryTicketStore,
    TicketStore,
};
use seatledger_types::*;
use tokio::sync::watch;

const DAY: i64 = 24 * 3600;

/// Helper: one event's venue wired to a fresh engine.
struct Venue {
    engine: SeatLedgerEngine,
    clock: Arc<ManualClock>,
    tickets: Arc<InMemoryTicketStore>,
    buyers: Arc<InMemoryBuyerDirectory>,
    ledger: Arc<SimulatedLedger>,
    publisher: Arc<InMemoryMetadataPublisher>,
    provider: SigningKey,
    event: EventId,
}

impl Venue {
    async fn open(config: EngineConfig, ledger_config: LedgerSimConfig, seats: &[&str]) -> Self {
        let clock = Arc::new(ManualClock::at_epoch());
        let seat_store = Arc::new(InMemorySeatStore::new());
        let tickets = Arc::new(InMemoryTicketStore::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let catalog = Arc::new(InMemoryEventCatalog::new());
        let ledger = Arc::new(SimulatedLedger::new(ledger_config, clock.clone()));
        let publisher = Arc::new(InMemoryMetadataPublisher::new("mem://venue"));
        let provider = SigningKey::from_bytes(&[42u8; 32]);

        let event = EventId::new();
        seat_store
            .provision(event, seats.iter().copied().map(SeatId::new))
            .await;
        catalog.add_event(event, "Harbour Lights").await;

        let deps = EngineDeps {
            seats: seat_store,
            tickets: tickets.clone(),
            buyers: buyers.clone(),
            catalog,
            ledger: ledger.clone(),
            publisher: publisher.clone(),
            clock: clock.clone(),
        };
        let engine = SeatLedgerEngine::new(config, deps, Some(provider.verifying_key()))
            .expect("default config is valid");

        Self {
            engine,
            clock,
            tickets,
            buyers,
            ledger,
            publisher,
            provider,
            event,
        }
    }

    async fn default_open() -> Self {
        Self::open(
            EngineConfig::default(),
            LedgerSimConfig::default(),
            &["A-01", "A-02", "A-03"],
        )
        .await
    }

    /// Register a buyer with a wallet and a signed identity proof.
    async fn buyer(&self, name: &str) -> UserId {
        let buyer = UserId::new();
        self.buyers
            .register(buyer, WalletAddress::derived_from(name.as_bytes()), name)
            .await;
        let mut proof_hash = [0u8; 32];
        proof_hash[..name.len().min(32)].copy_from_slice(&name.as_bytes()[..name.len().min(32)]);
        self.buyers
            .set_identity_proof(IdentityProof::sign(buyer, proof_hash, Utc::now(), &self.provider))
            .await;
        buyer
    }

    async fn status(&self, seat: &str) -> SeatStatus {
        self.engine
            .seat(self.event, &SeatId::new(seat))
            .await
            .unwrap()
            .effective_status(self.clock.now())
    }

    async fn hold(&self, seat: &str, buyer: UserId) -> Result<SeatAssignment> {
        self.engine
            .acquire_hold(self.event, &SeatId::new(seat), buyer)
            .await
    }

    async fn issue(&self, seat: &str, buyer: UserId) -> Result<Ticket> {
        self.engine
            .issue_ticket(self.event, &SeatId::new(seat), buyer, Decimal::new(6500, 2))
            .await
    }

    async fn buy(&self, seat: &str, buyer: UserId) -> Ticket {
        self.hold(seat, buyer).await.expect("hold should succeed");
        self.issue(seat, buyer).await.expect("issuance should succeed")
    }

    async fn cancel(&self, ticket: &Ticket) -> Result<CancellationOutcome> {
        self.engine
            .cancel_ticket(
                ticket.ticket_id,
                &ticket.seat_id,
                ticket.ledger_token_id.expect("issued tickets carry a token"),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Holds
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_holds_never_double_sell() {
    let venue = Venue::default_open().await;
    let mut buyers = Vec::new();
    for i in 0..24 {
        buyers.push(venue.buyer(&format!("fan-{i}")).await);
    }

    let mut handles = Vec::new();
    for buyer in buyers {
        let engine = venue.engine.clone();
        let event = venue.event;
        handles.push(tokio::spawn(async move {
            engine.acquire_hold(event, &SeatId::new("A-01"), buyer).await
        }));
    }

    let mut won = 0;
    let mut refused = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(SeatLedgerError::SeatUnavailable { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(refused, 23);
    assert_eq!(venue.status("A-01").await, SeatStatus::Hold);
}

#[tokio::test]
async fn expired_hold_is_reclaimed_and_stale_checkout_fails() {
    let venue = Venue::default_open().await;
    let b1 = venue.buyer("b1").await;
    let b2 = venue.buyer("b2").await;

    venue.hold("A-01", b1).await.unwrap();
    venue.clock.advance_secs(601);
    assert_eq!(venue.status("A-01").await, SeatStatus::Available);

    venue.hold("A-01", b2).await.unwrap();
    let err = venue.issue("A-01", b1).await.unwrap_err();
    assert!(matches!(err, SeatLedgerError::HoldExpiredOrStolen { .. }));
    assert_eq!(venue.ledger.token_count().await, 0);

    let ticket = venue.issue("A-01", b2).await.unwrap();
    assert_eq!(ticket.buyer_id, b2);
    assert_eq!(venue.status("A-01").await, SeatStatus::Sold);
}

#[tokio::test]
async fn released_hold_frees_the_seat() {
    let venue = Venue::default_open().await;
    let b1 = venue.buyer("b1").await;
    let b2 = venue.buyer("b2").await;

    venue.hold("A-02", b1).await.unwrap();
    assert!(venue.hold("A-02", b2).await.is_err());
    let outcome = venue
        .engine
        .release_hold(venue.event, &SeatId::new("A-02"), b1)
        .await
        .unwrap();
    assert_eq!(outcome, ReleaseOutcome::Released);
    venue.hold("A-02", b2).await.unwrap();
}

#[tokio::test]
async fn sweep_reclaims_abandoned_holds() {
    let venue = Venue::default_open().await;
    let b1 = venue.buyer("b1").await;
    venue.hold("A-01", b1).await.unwrap();
    venue.hold("A-02", b1).await.unwrap();

    venue.clock.advance_secs(700);
    let report = venue.engine.sweep_expired().await.unwrap();
    assert_eq!(report.reclaimed, 2);
    let row = venue
        .engine
        .seat(venue.event, &SeatId::new("A-01"))
        .await
        .unwrap();
    assert_eq!(row.status, SeatStatus::Available);
    assert_eq!(row.holding_actor_id, None);
}

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issuance_links_ticket_ledger_and_metadata() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-03", ada).await;

    let token = ticket.ledger_token_id.unwrap();
    assert_eq!(
        venue.ledger.owner_of(token).await.unwrap(),
        WalletAddress::derived_from(b"ada")
    );
    assert!(venue.publisher.contains(&ticket.metadata_uri).await);
    assert_eq!(
        venue.tickets.find_by_token(token).await.unwrap(),
        Some(ticket.clone())
    );
    // 0.1 % platform fee.
    assert_eq!(
        venue.ledger.net_price(token).await,
        Some(Decimal::new(6500, 2) - Decimal::new(65, 3))
    );
    assert!(venue.engine.reconcile_event(venue.event).await.unwrap().is_clean());
}

#[tokio::test]
async fn mint_failure_returns_seat_and_leaves_no_trace() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    venue.hold("A-01", ada).await.unwrap();
    venue
        .ledger
        .inject_failure(LedgerOp::Mint, ExternalError::permanent("insufficient funds"))
        .await;

    let err = venue.issue("A-01", ada).await.unwrap_err();
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(venue.status("A-01").await, SeatStatus::Available);
    assert!(venue.tickets.is_empty().await);
    assert!(venue.publisher.is_empty().await);
    assert!(venue.publisher.delete_calls() >= 1);

    // The hold is spent; a fresh hold and retry succeed.
    let ticket = venue.buy("A-01", ada).await;
    assert_eq!(ticket.seat_id, SeatId::new("A-01"));
}

#[tokio::test]
async fn persistence_failure_after_mint_is_fatal_and_keeps_seat_sold() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    venue.hold("A-01", ada).await.unwrap();
    venue.tickets.fail_inserts(true);

    let err = venue.issue("A-01", ada).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
    let SeatLedgerError::PersistenceAfterMintFailed { token_id, .. } = err else {
        panic!("expected PersistenceAfterMintFailed, got {err}");
    };
    assert_eq!(venue.status("A-01").await, SeatStatus::Sold);

    let report = venue.engine.reconcile_event(venue.event).await.unwrap();
    assert_eq!(report.orphaned_tokens, vec![token_id]);
}

#[tokio::test]
async fn metadata_outage_restores_hold_for_retry() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    venue.hold("A-01", ada).await.unwrap();
    venue.publisher.fail_next_publishes(10);

    let err = venue.issue("A-01", ada).await.unwrap_err();
    assert!(matches!(err, SeatLedgerError::MetadataPublishFailed { .. }));
    assert_eq!(venue.status("A-01").await, SeatStatus::Hold);
    assert_eq!(venue.ledger.token_count().await, 0);

    venue.publisher.fail_next_publishes(0);
    venue.issue("A-01", ada).await.unwrap();
}

#[tokio::test]
async fn one_ticket_per_buyer_per_event() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    venue.buy("A-01", ada).await;

    venue.hold("A-02", ada).await.unwrap();
    let err = venue.issue("A-02", ada).await.unwrap_err();
    assert!(matches!(err, SeatLedgerError::DuplicateMint { .. }));
    assert_eq!(venue.ledger.token_count().await, 1);
}

// ---------------------------------------------------------------------------
// Cancellation and reopen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_seat_reopens_after_cooling_off_exactly_once() {
    let venue = Venue::open(
        EngineConfig::default(),
        LedgerSimConfig {
            cooling_off_secs: 7 * DAY,
            ..LedgerSimConfig::default()
        },
        &["A-01"],
    )
    .await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-01", ada).await;

    let cancelled_at = venue.clock.now_epoch_secs();
    let outcome = venue.cancel(&ticket).await.unwrap();
    assert_eq!(outcome.reopen_at(), Some(cancelled_at + 7 * DAY));

    venue.clock.advance_secs(6 * DAY);
    assert_eq!(
        venue.engine.run_reopen_once().await.unwrap(),
        ReopenReport::default()
    );
    assert_eq!(venue.status("A-01").await, SeatStatus::Sold);

    venue.clock.advance_secs(DAY + 1);
    let report = venue.engine.run_reopen_once().await.unwrap();
    assert_eq!(report.reopened, 1);
    assert_eq!(venue.status("A-01").await, SeatStatus::Available);

    let rerun = venue.engine.run_reopen_once().await.unwrap();
    assert_eq!(rerun.reopened, 0);

    // The seat sells again; the old ticket stays cancelled.
    let bob = venue.buyer("bob").await;
    venue.buy("A-01", bob).await;
    assert!(matches!(
        venue.cancel(&ticket).await.unwrap(),
        CancellationOutcome::AlreadyCancelled { .. }
    ));
}

#[tokio::test]
async fn cancellation_rejected_by_ledger_changes_nothing() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-01", ada).await;
    venue
        .ledger
        .inject_failure(LedgerOp::MarkCancelled, ExternalError::permanent("revert"))
        .await;

    let err = venue.cancel(&ticket).await.unwrap_err();
    assert!(matches!(err, SeatLedgerError::CancellationRejected { .. }));
    let row = venue.tickets.get(ticket.ticket_id).await.unwrap().unwrap();
    assert_eq!(row.cancelled_at, None);
    assert_eq!(row.reopen_at, None);
}

#[tokio::test(start_paused = true)]
async fn background_jobs_reopen_and_sweep_until_shutdown() {
    let venue = Venue::open(
        EngineConfig::default(),
        LedgerSimConfig {
            cooling_off_secs: DAY,
            ..LedgerSimConfig::default()
        },
        &["A-01", "A-02"],
    )
    .await;
    let ada = venue.buyer("ada").await;
    let bob = venue.buyer("bob").await;
    let ticket = venue.buy("A-01", ada).await;
    venue.cancel(&ticket).await.unwrap();
    venue.hold("A-02", bob).await.unwrap();
    venue.clock.advance_secs(DAY);

    let (tx, rx) = watch::channel(false);
    let handles = venue.engine.spawn_background(&rx);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let a01 = venue.engine.seat(venue.event, &SeatId::new("A-01")).await.unwrap();
    let a02 = venue.engine.seat(venue.event, &SeatId::new("A-02")).await.unwrap();
    assert_eq!(a01.status, SeatStatus::Available);
    assert_eq!(a02.status, SeatStatus::Available);

    tx.send(true).unwrap();
    for h in handles {
        h.await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verified_ticket_is_admitted_once() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-01", ada).await;
    let token = ticket.ledger_token_id.unwrap();
    venue.engine.register_identity(token, ada).await.unwrap();

    let verdict = venue.engine.verify_for_entry(token, ada).await.unwrap();
    assert!(verdict.can_enter, "{:?}", verdict.errors);

    let first = venue.engine.admit(token, ada).await.unwrap();
    assert!(first.is_admitted());
    let second = venue.engine.admit(token, ada).await.unwrap();
    assert!(matches!(second, AdmissionOutcome::AlreadyUsed(_)));
    assert!(second.verdict().already_used);

    let err = venue.cancel(&ticket).await.unwrap_err();
    assert!(matches!(err, SeatLedgerError::TicketAlreadyUsed(_)));
}

#[tokio::test]
async fn fabricated_owner_mismatch_blocks_entry_with_full_diagnostic() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-01", ada).await;
    let token = ticket.ledger_token_id.unwrap();
    venue.engine.register_identity(token, ada).await.unwrap();

    // DB says ada, ledger says someone else.
    venue
        .ledger
        .force_owner(token, WalletAddress::derived_from(b"mallory"))
        .await;

    let verdict = venue.engine.verify_for_entry(token, ada).await.unwrap();
    assert!(!verdict.can_enter);
    assert!(!verdict.checks.ownership.valid);
    assert!(verdict.errors.iter().any(|e| e.starts_with("ownership:")));
    let kinds: Vec<_> = verdict.checks.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CheckKind::Ownership,
            CheckKind::Usage,
            CheckKind::Identity,
            CheckKind::Cancellation
        ]
    );

    let err = venue.engine.admit(token, ada).await.unwrap_err();
    assert!(matches!(
        err,
        SeatLedgerError::VerificationInconsistency {
            check: CheckKind::Ownership,
            ..
        }
    ));
}

#[tokio::test]
async fn cancelled_ticket_is_denied_entry() {
    let venue = Venue::default_open().await;
    let ada = venue.buyer("ada").await;
    let ticket = venue.buy("A-01", ada).await;
    let token = ticket.ledger_token_id.unwrap();
    venue.engine.register_identity(token, ada).await.unwrap();
    venue.cancel(&ticket).await.unwrap();

    let outcome = venue.engine.admit(token, ada).await.unwrap();
    let AdmissionOutcome::Denied(verdict) = outcome else {
        panic!("expected Denied, got {outcome:?}");
    };
    assert!(!verdict.checks.cancellation.valid);
    assert!(!verdict.checks.cancellation.inconsistent);
}

#[tokio::test]
async fn unregistered_identity_blocks_entry_unless_advisory() {
    let strict = Venue::default_open().await;
    let ada = strict.buyer("ada").await;
    let token = strict.buy("A-01", ada).await.ledger_token_id.unwrap();
    let verdict = strict.engine.verify_for_entry(token, ada).await.unwrap();
    assert!(!verdict.can_enter);
    assert!(!verdict.checks.identity.valid);

    let relaxed = Venue::open(
        EngineConfig {
            enforce_identity_verification: false,
            ..EngineConfig::default()
        },
        LedgerSimConfig::default(),
        &["A-01"],
    )
    .await;
    let ada = relaxed.buyer("ada").await;
    let token = relaxed.buy("A-01", ada).await.ledger_token_id.unwrap();
    let outcome = relaxed.engine.admit(token, ada).await.unwrap();
    assert!(outcome.is_admitted());
    assert!(!outcome.verdict().checks.identity.enforced);
}
