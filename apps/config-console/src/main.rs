//! Config Console Binary
//!
//! Starts the live configuration reconciliation service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin config-console
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CONSOLE_CHANNEL_URL`: WebSocket URL of the pipeline state feed
//!
//! ## Optional
//! - `CONSOLE_API_PORT`: Operator API port (default: 8090)
//! - `CONSOLE_HEALTH_PORT`: Health check HTTP port (default: 8091)
//! - `CONSOLE_CACHE_TTL_SECS`: Cache record TTL in seconds (default: 300)
//! - `CONSOLE_PING_INTERVAL_SECS`: Keep-alive ping interval (default: 20)
//! - `CONSOLE_RECONNECT_DELAY_INITIAL_MS`: Initial reconnect delay (default: 500)
//! - `CONSOLE_RECONNECT_DELAY_MAX_SECS`: Maximum reconnect delay (default: 30)
//! - `CONSOLE_RECONNECT_DELAY_MULTIPLIER`: Backoff multiplier (default: 2.0)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use config_console::infrastructure::channel::client::{
    ChannelClient, ChannelClientConfig, ChannelEvent, ChannelUpdateSink,
};
use config_console::infrastructure::metrics;
use config_console::{
    ApiServer, ConfigCacheStore, ConsoleService, ConsoleSettings, HealthServer, HealthServerState,
    init_metrics, init_telemetry,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queue depth for inbound channel events.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Queue depth for outbound update frames.
const UPDATE_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let _ = dotenvy::dotenv();

    init_telemetry();

    tracing::info!("Starting config console");

    let _metrics_handle = init_metrics();

    let settings = ConsoleSettings::from_env()?;
    log_config(&settings);

    let shutdown_token = CancellationToken::new();

    // The one shared mutable resource: the reconciliation cache.
    let store = Arc::new(ConfigCacheStore::new(settings.cache.ttl));

    // Channel plumbing: events in, update frames out.
    let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(EVENT_QUEUE_DEPTH);
    let (update_tx, update_rx) = mpsc::channel(UPDATE_QUEUE_DEPTH);

    let channel_config = ChannelClientConfig {
        url: settings.channel.url.clone(),
        ping_interval: settings.channel.ping_interval,
        backoff: settings.channel.backoff(),
    };
    let channel_client = ChannelClient::new(
        channel_config,
        event_tx,
        update_rx,
        shutdown_token.clone(),
    );

    let service = Arc::new(ConsoleService::new(
        Arc::clone(&store),
        Arc::new(ChannelUpdateSink::new(update_tx)),
    ));

    // Health server state tracks channel connectivity for readiness probes.
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&store),
    ));
    let health_server = HealthServer::new(
        settings.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );

    let api_server = ApiServer::new(
        settings.server.api_port,
        Arc::clone(&service),
        shutdown_token.clone(),
    );

    // Spawn the channel client.
    tokio::spawn(channel_client.run());

    // Spawn the event loop: the single writer stream for server pushes.
    let event_service = Arc::clone(&service);
    let event_health_state = Arc::clone(&health_state);
    tokio::spawn(async move {
        handle_channel_events(event_rx, event_service, event_health_state).await;
    });

    // Spawn the periodic eviction sweep.
    let sweep_store = Arc::clone(&store);
    let sweep_token = shutdown_token.clone();
    tokio::spawn(async move {
        run_eviction_sweep(sweep_store, sweep_token).await;
    });

    // Spawn the HTTP servers.
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "Operator API error");
        }
    });

    tracing::info!("Config console ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Config console stopped");
    Ok(())
}

/// Handle events from the pipeline channel client.
async fn handle_channel_events(
    mut rx: mpsc::Receiver<ChannelEvent>,
    service: Arc<ConsoleService>,
    health_state: Arc<HealthServerState>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ChannelEvent::Connected => {
                health_state.set_channel_connected(true);
                metrics::set_channel_connected(true);
                tracing::info!("Pipeline channel connected");
            }
            ChannelEvent::Disconnected => {
                health_state.set_channel_connected(false);
                metrics::set_channel_connected(false);
                tracing::warn!("Pipeline channel disconnected");
            }
            ChannelEvent::Reconnecting { attempt } => {
                metrics::record_reconnect();
                tracing::info!(attempt, "Pipeline channel reconnecting");
            }
            ChannelEvent::Snapshot { configs } => {
                health_state.record_snapshot();
                let entities = configs.len();
                let summary = service.apply_snapshot(configs);
                metrics::record_snapshot(entities as u64);
                metrics::set_store_stats(service.stats());
                tracing::debug!(
                    entities = summary.entities,
                    created = summary.created,
                    preserved_edits = summary.preserved_edits,
                    "Snapshot applied"
                );
            }
            ChannelEvent::ProtocolError(reason) => {
                metrics::record_protocol_error();
                tracing::warn!(reason = %reason, "Inbound frame rejected");
            }
        }
    }
}

/// Periodically sweep expired cache records.
///
/// Expiry is also checked lazily on every access; the sweep exists so that
/// records nothing reads still disappear.
async fn run_eviction_sweep(store: Arc<ConfigCacheStore>, cancel: CancellationToken) {
    let period = (store.ttl() / 4).max(std::time::Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Eviction sweep cancelled");
                break;
            }
            _ = interval.tick() => {
                let evicted = store.evict_expired();
                if evicted > 0 {
                    metrics::record_evictions(evicted as u64);
                    metrics::set_store_stats(store.stats());
                    tracing::info!(evicted, "Expired cache records evicted");
                }
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(settings: &ConsoleSettings) {
    tracing::info!(
        channel_url = %settings.channel.url,
        api_port = settings.server.api_port,
        health_port = settings.server.health_port,
        cache_ttl_secs = settings.cache.ttl.as_secs(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
