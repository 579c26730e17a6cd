//! SeatLedger node.
//!
//! Loads a [`NodeConfig`] from the JSON file named by `SEATLEDGER_CONFIG`
//! (defaults otherwise), wires the engine over the in-memory stores and the
//! simulated ledger, provisions the configured events and runs the reopen
//! and hold-sweep jobs until Ctrl-C.

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use seatledger_engine::{EngineDeps, SeatLedgerEngine};
use seatledger_ledger::{InMemoryMetadataPublisher, SimulatedLedger};
use seatledger_store::{
    InMemoryBuyerDirectory, InMemoryEventCatalog, InMemorySeatStore, InMemoryTicketStore,
};
use seatledger_types::{
    Clock, LogFormat, NodeConfig, Result, SeatLedgerError, SystemClock, constants,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn load_config() -> Result<NodeConfig> {
    let config = match std::env::var(constants::CONFIG_ENV_VAR) {
        Ok(path) => NodeConfig::from_json(&std::fs::read_to_string(&path)?)?,
        Err(_) => NodeConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Build the engine and provision every configured event.
async fn build_engine(config: &NodeConfig, clock: Arc<dyn Clock>) -> Result<SeatLedgerEngine> {
    let identity_verifier = config
        .identity_verifier_bytes()?
        .map(|bytes| {
            VerifyingKey::from_bytes(&bytes).map_err(|e| {
                SeatLedgerError::Configuration(format!("identity_verifier_key: {e}"))
            })
        })
        .transpose()?;
    if identity_verifier.is_none() {
        info!("No identity verifier key configured; identity proofs are checked for presence only");
    }

    let seats = Arc::new(InMemorySeatStore::new());
    let catalog = Arc::new(InMemoryEventCatalog::new());
    for event in &config.events {
        let created = seats.provision(event.event_id, event.seats.iter().cloned()).await;
        catalog.add_event(event.event_id, event.title.clone()).await;
        info!(event_id = %event.event_id, title = %event.title, seats = created, "Event provisioned");
    }

    let deps = EngineDeps {
        seats,
        tickets: Arc::new(InMemoryTicketStore::new()),
        buyers: Arc::new(InMemoryBuyerDirectory::new()),
        catalog,
        ledger: Arc::new(SimulatedLedger::new(config.ledger.clone(), clock.clone())),
        publisher: Arc::new(InMemoryMetadataPublisher::new(config.metadata_base_uri())),
        clock,
    };
    SeatLedgerEngine::new(config.engine.clone(), deps, identity_verifier)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_tracing(config.log_format);
    info!(
        events = config.events.len(),
        cooling_off_secs = config.ledger.cooling_off_secs,
        "SeatLedger node starting"
    );

    let engine = build_engine(&config, Arc::new(SystemClock)).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = engine.spawn_background(&shutdown_rx);
    drop(shutdown_rx);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
    }
    stop_background(&shutdown_tx, jobs).await;
    info!("SeatLedger node stopped");
    Ok(())
}

/// Signal the background jobs to stop and wait for them.
async fn stop_background(shutdown_tx: &watch::Sender<bool>, jobs: Vec<JoinHandle<()>>) -> usize {
    if shutdown_tx.send(true).is_err() {
        debug!("Background jobs already stopped");
    }
    let mut panicked = 0;
    for job in jobs {
        if let Err(e) = job.await {
            panicked += 1;
            error!(error = %e, "Background job panicked");
        }
    }
    panicked
}

#[cfg(test)]
mod tests {
    use seatledger_types::{EventId, SeatId, SeatStatus};

    use super::*;

    #[tokio::test]
    async fn provisions_configured_events() {
        let event = EventId::new();
        let raw = format!(
            r#"{{"events": [{{"event_id": "{}", "title": "Opening Night", "seats": ["A-01", "A-02"]}}]}}"#,
            event.0
        );
        let config = NodeConfig::from_json(&raw).unwrap();
        let engine = build_engine(&config, Arc::new(SystemClock)).await.unwrap();

        let row = engine.seat(event, &SeatId::new("A-02")).await.unwrap();
        assert_eq!(row.status, SeatStatus::Available);
        assert!(engine.seat(event, &SeatId::new("Z-99")).await.is_err());
    }

    #[tokio::test]
    async fn stop_background_joins_running_jobs() {
        let config = NodeConfig::default();
        let engine = build_engine(&config, Arc::new(SystemClock)).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let jobs = engine.spawn_background(&shutdown_rx);
        drop(shutdown_rx);
        assert_eq!(stop_background(&shutdown_tx, jobs).await, 0);
    }

    #[tokio::test]
    async fn stop_background_tolerates_exited_jobs() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_rx);
        let jobs = vec![tokio::spawn(async {})];
        assert_eq!(stop_background(&shutdown_tx, jobs).await, 0);
    }

    #[tokio::test]
    async fn rejects_malformed_verifier_key() {
        let config = NodeConfig {
            identity_verifier_key: Some("abcd".into()),
            ..NodeConfig::default()
        };
        let err = build_engine(&config, Arc::new(SystemClock)).await.err().unwrap();
        assert!(matches!(err, SeatLedgerError::Configuration(_)));
    }
}
