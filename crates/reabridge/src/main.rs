//! Entry point for the REAPER state bridge.
//!
//! Loads configuration, starts the poller against REAPER's web interface
//! and serves `WebSocket` clients, static files and the proxy on one port.
//!
//! # Architecture
//!
//! ```text
//! REAPER /_/KEYS --> Poller --> SnapshotStore
//!                        |
//!                        +--> Broadcaster --> sessions --> WebSocket clients
//! ```
//!
//! Shutdown on Ctrl-C or SIGTERM cancels one token shared by the poller,
//! every session and the HTTP server.

mod cli;
mod config;

use std::sync::Arc;

use clap::Parser;
use reabridge_core::{
    Broadcaster, HttpUpstream, Poller, PollerConfig, SessionManager, SnapshotStore,
};
use reabridge_server::announce::spawn_registration;
use reabridge_server::{AppState, Routes, StaticFiles, UpstreamProxy, bind, spawn_server, stop_server};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{BridgeConfig, LogFormat};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listen
/// address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::load(&cli)?;

    init_tracing(config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "reabridge starting");
    info!(
        reaper_url = config.reaper_url,
        poll_get_keys = config.poll_get_keys,
        poll_interval_ms = config.poll_interval_ms,
        addr = config.addr,
        ws_path = config.ws_path,
        www_root_path = %config.www_root_path.display(),
        health_path = config.health_path,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let store = Arc::new(SnapshotStore::new());
    let sessions = Arc::new(SessionManager::new(Arc::clone(&store)));
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&sessions),
        config.min_broadcast_interval(),
    ));

    let poller = if config.poll_get_keys.is_empty() {
        warn!("poll_get_keys is empty, polling disabled");
        None
    } else {
        let upstream = HttpUpstream::new(
            &config.reaper_url,
            &config.poll_get_keys,
            config.poll_timeout(),
        );
        info!(url = upstream.url(), "Polling REAPER");
        let poller = Poller::new(
            upstream,
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            PollerConfig {
                interval: config.poll_interval(),
                error_cooldown: config.poll_error_cooldown(),
            },
        );
        Some(tokio::spawn(poller.run(shutdown.clone())))
    };

    let state = Arc::new(AppState::new(
        Arc::clone(&sessions),
        StaticFiles::new(config.www_root_path.clone()),
        UpstreamProxy::new(&config.reaper_url, config.proxy_timeout()),
        Routes {
            ws_path: config.ws_path.clone(),
            health_path: config.health_path.clone(),
        },
        shutdown.clone(),
    ));

    let listener = bind(config.listen_addr()?).await?;
    let port = listener.local_addr()?.port();
    let server = spawn_server(listener, state);

    if !config.reaper_rc_name.is_empty() {
        spawn_registration(config.reaper_rc_name.clone(), port);
    }

    wait_for_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }
    stop_server(server, config.shutdown_grace()).await;

    info!("reabridge stopped");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
