//! Configuration types for SeatLedger engines and nodes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EventId, SeatId, SeatLedgerError, constants};

/// Policy knobs of the consistency engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Checkout hold window.
    pub hold_ttl_secs: u64,
    /// Reopen job period.
    pub reopen_interval_secs: u64,
    /// Expired-hold sweep period; `0` disables the sweep.
    pub hold_sweep_interval_secs: u64,
    /// Whether a failed identity check denies entry. When `false` the check
    /// still runs and is reported as advisory.
    pub enforce_identity_verification: bool,
    /// Refuse to mint a second ticket for the same wallet and event.
    pub enforce_single_ticket_per_event: bool,
    /// Publish attempts before issuance fails with `MetadataPublishFailed`.
    pub metadata_publish_attempts: u32,
    /// Maximum due tickets handled per reopen run.
    pub reopen_batch_limit: usize,
    /// Base delay before a failed reopen is retried.
    pub reopen_retry_backoff_secs: u64,
    /// Maximum expired holds handled per sweep run.
    pub sweep_batch_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_ttl_secs: constants::DEFAULT_HOLD_TTL_SECS,
            reopen_interval_secs: constants::DEFAULT_REOPEN_INTERVAL_SECS,
            hold_sweep_interval_secs: constants::DEFAULT_HOLD_SWEEP_INTERVAL_SECS,
            enforce_identity_verification: true,
            enforce_single_ticket_per_event: true,
            metadata_publish_attempts: constants::DEFAULT_METADATA_PUBLISH_ATTEMPTS,
            reopen_batch_limit: constants::DEFAULT_REOPEN_BATCH_LIMIT,
            reopen_retry_backoff_secs: constants::DEFAULT_REOPEN_RETRY_BACKOFF_SECS,
            sweep_batch_limit: constants::DEFAULT_SWEEP_BATCH_LIMIT,
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// [`SeatLedgerError::Configuration`] on any out-of-range value.
    pub fn validate(&self) -> crate::Result<()> {
        if self.hold_ttl_secs == 0 || self.hold_ttl_secs > constants::MAX_HOLD_TTL_SECS {
            return Err(SeatLedgerError::Configuration(format!(
                "hold_ttl_secs must be in 1..={}, got {}",
                constants::MAX_HOLD_TTL_SECS,
                self.hold_ttl_secs
            )));
        }
        if self.reopen_interval_secs == 0 {
            return Err(SeatLedgerError::Configuration(
                "reopen_interval_secs must be positive".into(),
            ));
        }
        if self.metadata_publish_attempts == 0 {
            return Err(SeatLedgerError::Configuration(
                "metadata_publish_attempts must be at least 1".into(),
            ));
        }
        if self.reopen_batch_limit == 0 || self.sweep_batch_limit == 0 {
            return Err(SeatLedgerError::Configuration(
                "batch limits must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn hold_ttl(&self) -> Duration {
        Duration::from_secs(self.hold_ttl_secs)
    }

    #[must_use]
    pub fn reopen_interval(&self) -> Duration {
        Duration::from_secs(self.reopen_interval_secs)
    }

    /// Delay before retrying a reopen that has already failed
    /// `previous_failures` times: the base backoff doubled per failure,
    /// capped at [`constants::MAX_REOPEN_RETRY_BACKOFF_SECS`].
    #[must_use]
    pub fn reopen_retry_delay_secs(&self, previous_failures: u32) -> i64 {
        let delay = self
            .reopen_retry_backoff_secs
            .saturating_mul(1u64 << previous_failures.min(16))
            .min(constants::MAX_REOPEN_RETRY_BACKOFF_SECS);
        i64::try_from(delay).unwrap_or(i64::MAX)
    }

    /// `None` when the sweep is disabled.
    #[must_use]
    pub fn hold_sweep_interval(&self) -> Option<Duration> {
        (self.hold_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.hold_sweep_interval_secs))
    }
}

/// Policy of the in-process ledger simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSimConfig {
    /// Delay between cancellation and the earliest reopen.
    pub cooling_off_secs: i64,
    /// Random extra delay in `[0, jitter)` added to each cooling-off window.
    pub cooling_off_jitter_secs: i64,
    /// Platform fee deducted from each mint price.
    pub platform_fee_bps: u32,
}

impl Default for LedgerSimConfig {
    fn default() -> Self {
        Self {
            cooling_off_secs: constants::DEFAULT_COOLING_OFF_SECS,
            cooling_off_jitter_secs: 0,
            platform_fee_bps: constants::DEFAULT_PLATFORM_FEE_BPS,
        }
    }
}

impl LedgerSimConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.cooling_off_secs < 0 || self.cooling_off_jitter_secs < 0 {
            return Err(SeatLedgerError::Configuration(
                "cooling-off windows must be non-negative".into(),
            ));
        }
        if self.platform_fee_bps > constants::BPS_DENOMINATOR {
            return Err(SeatLedgerError::Configuration(format!(
                "platform_fee_bps must be <= {}, got {}",
                constants::BPS_DENOMINATOR,
                self.platform_fee_bps
            )));
        }
        Ok(())
    }
}

/// Log output style of the node binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Seats to provision for one event at node start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProvisioning {
    pub event_id: EventId,
    pub title: String,
    pub seats: Vec<SeatId>,
}

/// Configuration for a SeatLedger node process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub engine: EngineConfig,
    pub ledger: LedgerSimConfig,
    pub log_format: LogFormat,
    /// Hex-encoded ed25519 public key of the identity provider.
    pub identity_verifier_key: Option<String>,
    /// Base URI under which ticket metadata documents are published.
    pub metadata_base_uri: Option<String>,
    pub events: Vec<EventProvisioning>,
}

impl NodeConfig {
    /// Parse from JSON.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        serde_json::from_str(raw).map_err(|e| SeatLedgerError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.engine.validate()?;
        self.ledger.validate()?;
        self.identity_verifier_bytes()?;
        Ok(())
    }

    /// Decode `identity_verifier_key` into raw key bytes.
    pub fn identity_verifier_bytes(&self) -> crate::Result<Option<[u8; 32]>> {
        let Some(encoded) = &self.identity_verifier_key else {
            return Ok(None);
        };
        let raw = hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| SeatLedgerError::Configuration(format!("identity_verifier_key: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            SeatLedgerError::Configuration(format!(
                "identity_verifier_key must be 32 bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Some(bytes))
    }

    #[must_use]
    pub fn metadata_base_uri(&self) -> &str {
        self.metadata_base_uri
            .as_deref()
            .unwrap_or(constants::DEFAULT_METADATA_BASE_URI)
    }
}
