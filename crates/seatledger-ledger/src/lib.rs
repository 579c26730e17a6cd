//! # seatledger-ledger
//!
//! The external, append-only side of a ticket's life.
//!
//! - [`LedgerClient`]: the wire contract with the ticket ledger (mint,
//!   reads, cancellation, reopen acknowledgement, admission, identity
//!   proofs). Every call is an atomic black box that either fully succeeds
//!   or fully fails with an [`ExternalError`](seatledger_types::ExternalError).
//! - [`SimulatedLedger`]: an in-process soulbound ticket contract used by
//!   the node binary and by tests.
//! - [`MetadataPublisher`]: stores ticket documents and hands back
//!   retrievable URIs; `delete` exists only for compensation.

pub mod client;
pub mod metadata;
pub mod sim;

pub use client::LedgerClient;
pub use metadata::{InMemoryMetadataPublisher, MetadataPublisher};
pub use sim::{LedgerOp, SimulatedLedger};
