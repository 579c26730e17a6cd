//! # seatledger-engine
//!
//! Consistency engine between the relational seat/ticket stores and the
//! ticket ledger.
//!
//! - [`SeatHolds`]: seat hold state machine; every transition is one
//!   conditional write on the seat row
//! - [`IssuanceOrchestrator`]: HOLD → SOLD → metadata → mint → persist,
//!   with compensation for every step before the mint
//! - [`ReopenScheduler`]: ledger-first cancellation and the periodic job
//!   that returns cancelled seats to sale
//! - [`EntryReconciler`]: four-way entry verification and admission
//! - [`HoldSweeper`]: optional reclamation of lapsed holds
//! - [`MintReconciler`]: report-only orphan mint scan
//! - [`SeatLedgerEngine`]: facade wiring all of the above
//!
//! ## Seat lifecycle
//!
//! ```text
//!              acquire_hold                finalize_sale
//! AVAILABLE ───────────────▶ HOLD ──────────────────────▶ SOLD
//!     ▲   ◀─────────────────  │  ◀──── restore_hold ─────  │
//!     │    release / expiry   │                            │
//!     └──────── revert_sale (mint failed) ─────────────────┤
//!     └──────── reopen_seat (cancelled, cooling-off over) ─┘
//! ```

pub mod engine;
pub mod entry;
pub mod holds;
pub mod issuance;
pub mod jobs;
pub mod reconcile;
pub mod reopen;
pub mod sweep;

pub use engine::{EngineDeps, SeatLedgerEngine};
pub use entry::EntryReconciler;
pub use holds::{SaleTransition, SeatHolds};
pub use issuance::IssuanceOrchestrator;
pub use reconcile::{MintReconciler, ReconciliationReport};
pub use reopen::{ReopenReport, ReopenScheduler};
pub use sweep::{HoldSweeper, SweepReport};
