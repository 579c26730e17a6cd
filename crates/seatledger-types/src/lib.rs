//! # seatledger-types
//!
//! Shared types, errors, and configuration for the **SeatLedger** engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`EventId`], [`SeatId`], [`UserId`], [`TicketId`], [`LedgerTokenId`], [`WalletAddress`], [`TxHash`]
//! - **Seat model**: [`SeatAssignment`], [`SeatStatus`], [`SeatKey`], [`ReleaseOutcome`]
//! - **Ticket model**: [`Ticket`], [`CancellationOutcome`]
//! - **Ledger model**: [`LedgerTicketView`], [`MintRequest`], [`MintReceipt`]
//! - **Metadata**: [`TicketMetadata`], [`MetadataAttribute`]
//! - **Identity**: [`IdentityProof`]
//! - **Entry verification**: [`CheckKind`], [`CheckOutcome`], [`EntryChecks`], [`EntryVerdict`], [`AdmissionOutcome`]
//! - **Configuration**: [`EngineConfig`], [`LedgerSimConfig`], [`NodeConfig`]
//! - **Time**: [`Clock`], [`SystemClock`], `ManualClock` under `test-helpers`
//! - **Errors**: [`SeatLedgerError`] with `SL_ERR_` prefix codes, [`ExternalError`]
//! - **Constants**: system-wide limits and defaults

pub mod clock;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod metadata;
pub mod seat;
pub mod ticket;

// Re-export all primary types at crate root for ergonomic imports:
//   use seatledger_types::{SeatAssignment, Ticket, EntryVerdict, ...};

pub use clock::*;
pub use config::*;
pub use entry::*;
pub use error::*;
pub use identity::*;
pub use ids::*;
pub use ledger::*;
pub use metadata::*;
pub use seat::*;
pub use ticket::*;

// Constants are accessed via `seatledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
