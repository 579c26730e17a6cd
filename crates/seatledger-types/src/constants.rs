//! System-wide constants for the SeatLedger engine.

/// Default checkout hold window in seconds (10 minutes).
pub const DEFAULT_HOLD_TTL_SECS: u64 = 600;

/// Upper bound on a configurable hold window (24 hours).
pub const MAX_HOLD_TTL_SECS: u64 = 86_400;

/// Default reopen job period in seconds.
pub const DEFAULT_REOPEN_INTERVAL_SECS: u64 = 60;

/// Base delay before a failed reopen is retried; doubles per failure.
pub const DEFAULT_REOPEN_RETRY_BACKOFF_SECS: u64 = 60;

/// Ceiling on the reopen retry delay (1 hour).
pub const MAX_REOPEN_RETRY_BACKOFF_SECS: u64 = 3_600;

/// Default expired-hold sweep period in seconds. `0` disables the sweep.
pub const DEFAULT_HOLD_SWEEP_INTERVAL_SECS: u64 = 60;

/// Maximum due tickets processed per reopen run.
pub const DEFAULT_REOPEN_BATCH_LIMIT: usize = 500;

/// Maximum expired holds reclaimed per sweep run.
pub const DEFAULT_SWEEP_BATCH_LIMIT: usize = 1_000;

/// Metadata publish attempts before issuance gives up.
pub const DEFAULT_METADATA_PUBLISH_ATTEMPTS: u32 = 3;

/// Default ledger cooling-off window between cancellation and reopen (12 hours).
pub const DEFAULT_COOLING_OFF_SECS: i64 = 12 * 60 * 60;

/// Default ledger platform fee in basis points (0.1 %).
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 10;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Environment variable naming the node's JSON config file.
pub const CONFIG_ENV_VAR: &str = "SEATLEDGER_CONFIG";

/// Default base URI of the in-memory metadata publisher.
pub const DEFAULT_METADATA_BASE_URI: &str = "mem://seatledger";
