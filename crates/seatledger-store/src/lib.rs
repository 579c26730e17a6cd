//! # seatledger-store
//!
//! Relational-side persistence for the SeatLedger engine.
//!
//! ## Stores
//!
//! - [`SeatStore`]: one row per (event, seat). The only mutation primitive is
//!   [`SeatStore::compare_and_swap`], which is the single serialization point
//!   per seat. There is no cross-seat lock.
//! - [`TicketStore`]: tickets of record plus the claim markers the reopen
//!   job and the admission path use to stay idempotent under re-runs.
//! - [`BuyerDirectory`] / [`EventCatalog`]: read-only views of the identity
//!   and catalog collaborators.
//!
//! Each trait has an in-memory implementation guarded by a
//! `tokio::sync::RwLock`. The lock is held only for the duration of one
//! conditional write, never across collaborator I/O.

pub mod directory;
pub mod seats;
pub mod tickets;

pub use directory::{
    BuyerDirectory, BuyerProfile, EventCatalog, InMemoryBuyerDirectory, InMemoryEventCatalog,
};
pub use seats::{InMemorySeatStore, SeatStore};
pub use tickets::{InMemoryTicketStore, TicketStore};
