//! Error types for the SeatLedger engine.
//!
//! All errors use the `SL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Seat / hold errors
//! - 2xx: Issuance errors
//! - 3xx: Cancellation / reopen errors
//! - 4xx: Entry verification errors
//! - 5xx: External collaborator errors (ledger, publisher, stores)
//! - 9xx: General / internal errors
//!
//! `AlreadyCancelled` and `AlreadyUsed` are deliberately absent: repeated
//! cancellations and repeated entry scans are reported through
//! [`CancellationOutcome`](crate::CancellationOutcome) and
//! [`AdmissionOutcome`](crate::AdmissionOutcome) on the `Ok` path.

use thiserror::Error;

use crate::{CheckKind, EventId, LedgerTokenId, SeatId, SeatStatus, TicketId, TxHash, UserId};

/// Failure reported by an external collaborator (ledger, metadata
/// publisher, buyer directory).
///
/// `retryable` distinguishes transient faults (congestion, timeouts) from
/// permanent ones (reverts, insufficient funds). The issuance saga treats
/// both as permanent; the flag is carried for callers and logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExternalError {
    /// Whether the same call may succeed if retried unchanged.
    pub retryable: bool,
    /// Collaborator-provided message.
    pub message: String,
}

impl ExternalError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// `Result` alias for collaborator calls.
pub type ExternalResult<T> = std::result::Result<T, ExternalError>;

/// Central error enum for all SeatLedger operations.
#[derive(Debug, Error)]
pub enum SeatLedgerError {
    // =================================================================
    // Seat / Hold Errors (1xx)
    // =================================================================
    /// No seat row was provisioned for this (event, seat) pair.
    #[error("SL_ERR_100: Seat not found: {event_id}/{seat_id}")]
    SeatNotFound { event_id: EventId, seat_id: SeatId },

    /// The seat is held by someone else or already sold.
    #[error("SL_ERR_101: Seat unavailable: {event_id}/{seat_id} is {status}")]
    SeatUnavailable {
        event_id: EventId,
        seat_id: SeatId,
        status: SeatStatus,
    },

    /// The requested transition conflicts with the seat's current state
    /// (e.g. releasing a SOLD seat, releasing another actor's hold).
    #[error("SL_ERR_102: Seat conflict: {reason}")]
    Conflict { reason: String },

    /// A stored seat row violates the seat invariants.
    #[error("SL_ERR_103: Seat invariant violation: {reason}")]
    SeatInvariantViolation { reason: String },

    // =================================================================
    // Issuance Errors (2xx)
    // =================================================================
    /// Checkout raced against hold expiry or another actor's acquisition.
    #[error("SL_ERR_200: Hold expired or stolen: {event_id}/{seat_id} for buyer {buyer_id}")]
    HoldExpiredOrStolen {
        event_id: EventId,
        seat_id: SeatId,
        buyer_id: UserId,
    },

    /// Metadata publication failed; the seat hold was restored.
    #[error("SL_ERR_201: Metadata publish failed: {reason}")]
    MetadataPublishFailed { reason: String },

    /// The ledger mint failed; metadata deleted and seat returned to sale.
    #[error("SL_ERR_202: Mint failed: {reason}")]
    MintFailed { reason: String },

    /// The mint succeeded but the ticket row could not be written.
    /// Requires manual reconciliation: the on-ledger token is orphaned.
    #[error(
        "SL_ERR_203: Persistence after mint failed for {token_id} (tx {tx_hash}): {reason}"
    )]
    PersistenceAfterMintFailed {
        token_id: LedgerTokenId,
        tx_hash: TxHash,
        reason: String,
    },

    /// The buyer already holds a ledger ticket for this event.
    #[error("SL_ERR_204: Buyer {buyer_id} already minted a ticket for event {event_id}")]
    DuplicateMint { buyer_id: UserId, event_id: EventId },

    /// The buyer has no registered ledger wallet.
    #[error("SL_ERR_205: Buyer not registered: {0}")]
    BuyerNotRegistered(UserId),

    // =================================================================
    // Cancellation / Reopen Errors (3xx)
    // =================================================================
    /// No ticket row matches the given identifier.
    #[error("SL_ERR_300: Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// The ledger refused or failed to record the cancellation. No
    /// relational state was changed.
    #[error("SL_ERR_301: Cancellation rejected: {reason}")]
    CancellationRejected { reason: String },

    /// A used ticket cannot be cancelled.
    #[error("SL_ERR_302: Ticket already used: {0}")]
    TicketAlreadyUsed(TicketId),

    /// The caller's seat/token do not match the ticket of record.
    #[error("SL_ERR_303: Ticket mismatch for {ticket_id}: {reason}")]
    TicketMismatch { ticket_id: TicketId, reason: String },

    // =================================================================
    // Entry Verification Errors (4xx)
    // =================================================================
    /// Ledger and relational store disagree on a jointly authoritative fact.
    #[error("SL_ERR_400: Verification inconsistency in {check} check: {reason}")]
    VerificationInconsistency { check: CheckKind, reason: String },

    /// The ledger refused or failed to record admission.
    #[error("SL_ERR_401: Admission failed: {reason}")]
    AdmissionFailed { reason: String },

    /// An identity proof is malformed or its signature does not verify.
    #[error("SL_ERR_402: Invalid identity proof: {reason}")]
    InvalidIdentityProof { reason: String },

    /// The buyer has no identity proof on file.
    #[error("SL_ERR_403: Identity proof missing for buyer {0}")]
    IdentityProofMissing(UserId),

    // =================================================================
    // External Collaborator Errors (5xx)
    // =================================================================
    /// A ledger call failed outside of a saga step with its own variant.
    #[error("SL_ERR_500: Ledger error: {0}")]
    Ledger(ExternalError),

    /// A metadata publisher call failed outside of a saga step.
    #[error("SL_ERR_501: Publisher error: {0}")]
    Publisher(ExternalError),

    /// The buyer directory failed.
    #[error("SL_ERR_502: Directory error: {0}")]
    Directory(ExternalError),

    /// The relational store failed.
    #[error("SL_ERR_503: Store error: {0}")]
    Store(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// The request failed validation (bad price, non-positive TTL, ...).
    #[error("SL_ERR_900: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SL_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("SL_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (config file, signals).
    #[error("SL_ERR_903: I/O error: {0}")]
    Io(String),

    /// Unrecoverable internal error.
    #[error("SL_ERR_999: Internal error: {0}")]
    Internal(String),
}

impl SeatLedgerError {
    /// Steady-state errors the caller may resolve by retrying, re-holding or
    /// choosing another seat. Every one of these leaves no partial state.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SeatUnavailable { .. }
            | Self::HoldExpiredOrStolen { .. }
            | Self::MetadataPublishFailed { .. }
            | Self::MintFailed { .. } => true,
            Self::Ledger(e) | Self::Publisher(e) | Self::Directory(e) => e.retryable,
            _ => false,
        }
    }

    /// Errors that leave the system needing manual reconciliation.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PersistenceAfterMintFailed { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SeatLedgerError>;

impl From<std::io::Error> for SeatLedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SeatLedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
