//! Periodic background job loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Run `tick` every `period` until `shutdown` flips to `true` or its sender
/// is dropped. The first tick fires immediately.
///
/// A tick that overruns the period delays the next one; ticks never
/// overlap, so a job body needs no guard against concurrent runs of itself.
pub async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(job = name, period_secs = period.as_secs(), "Job started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(job = name, "Job stopped");
}
