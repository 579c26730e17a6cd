//! Periodic reclamation of lapsed holds.
//!
//! Readers already treat an expired hold as AVAILABLE, so the sweep is
//! housekeeping only: it keeps stored rows close to their effective state.

use seatledger_types::{EngineConfig, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::holds::SeatHolds;
use crate::jobs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub reclaimed: usize,
    /// Rows that changed between the scan and the conditional write.
    pub contended: usize,
}

#[derive(Clone)]
pub struct HoldSweeper {
    holds: SeatHolds,
    config: EngineConfig,
}

impl HoldSweeper {
    #[must_use]
    pub fn new(holds: SeatHolds, config: EngineConfig) -> Self {
        Self { holds, config }
    }

    /// Release every hold whose deadline has passed, up to the batch limit.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let now = self.holds.now();
        let expired = self
            .holds
            .store()
            .expired_holds(now, self.config.sweep_batch_limit)
            .await?;

        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };
        for row in &expired {
            match self.holds.reclaim_expired(row).await {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => report.contended += 1,
                Err(e) => {
                    report.contended += 1;
                    tracing::warn!(seat = %row.key(), error = %e, "Hold reclaim failed");
                }
            }
        }

        if report.examined > 0 {
            tracing::debug!(
                examined = report.examined,
                reclaimed = report.reclaimed,
                contended = report.contended,
                "Hold sweep complete"
            );
        }
        Ok(report)
    }

    /// Sweep on the configured interval until `shutdown` fires. Returns at
    /// once when the sweep is disabled.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let Some(period) = self.config.hold_sweep_interval() else {
            tracing::info!("Hold sweep disabled");
            return;
        };
        let this = &self;
        jobs::run_every("hold-sweep", period, shutdown, move || async move {
            if let Err(e) = this.sweep_expired().await {
                tracing::error!(error = %e, "Hold sweep failed");
            }
        })
        .await;
    }
}
