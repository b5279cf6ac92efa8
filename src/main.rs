//! TunnelForge Gateway
//!
//! Front door for a TunnelForge installation.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                       GATEWAY                        │
//!                       │                                                      │
//!   Client Request      │  ┌─────────┐   ┌──────────┐   ┌──────────┐           │
//!   ────────────────────┼─▶│  http   │──▶│ security │──▶│ routing  │           │
//!                       │  │ server  │   │ policies │   │ classify │           │
//!                       │  └─────────┘   └──────────┘   └────┬─────┘           │
//!                       │                                    │                 │
//!                       │        ┌───────────────┬───────────┼─────────┐       │
//!                       │        ▼               ▼           ▼         ▼       │
//!                       │  ┌──────────┐   ┌───────────┐  ┌───────┐ ┌───────┐   │
//!                       │  │  assets  │   │ websocket │  │ proxy │ │health │   │
//!                       │  │ + shell  │   │   proxy   │  │       │ │ csrf  │   │
//!                       │  └──────────┘   └─────┬─────┘  └───┬───┘ └───────┘   │
//!                       │                       └─────┬──────┘                 │
//!                       │                             ▼                        │
//!                       │                      ┌─────────────┐                 │
//!                       │                      │   backend   │─────────────────┼──▶ Backend
//!                       │                      └─────────────┘                 │
//!                       │                                                      │
//!                       │  ┌────────────────────────────────────────────────┐  │
//!                       │  │             Cross-Cutting Concerns             │  │
//!                       │  │  config · observability · lifecycle ·          │  │
//!                       │  │  persistence scheduler                         │  │
//!                       │  └────────────────────────────────────────────────┘  │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use tunnelforge_gateway::config::{self, validate};
use tunnelforge_gateway::lifecycle::{spawn_signal_watcher, Shutdown};
use tunnelforge_gateway::observability::{logging, metrics};
use tunnelforge_gateway::persistence::{PersistenceScheduler, SnapshotSaver};
use tunnelforge_gateway::{GatewayError, HttpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, issues) = config::load_from_env();
    logging::init(config.observability.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tunnelforge-gateway starting");
    config::log_issues(&issues);
    for warning in validate(&config) {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    tracing::info!(
        bind_address = %config.bind_address(),
        backend = %config.network.backend_url,
        static_dir = ?config.paths.static_dir,
        rate_limit = config.security.rate_limit_enabled,
        csrf = config.security.csrf_enabled,
        ip_allowlist = config.security.ip_allowlist_enabled,
        persistence = config.persistence.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Metrics exporter disabled");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let config = Arc::new(config);
    let server = HttpServer::new(config.clone())?;

    if let Err(source) = server.state().assets.check_root().await {
        if config.paths.require_static {
            let err = GatewayError::StaticRoot {
                path: config.paths.static_dir.clone(),
                source,
            };
            tracing::error!(error = %err, "Static root unavailable");
            return Err(err.into());
        }
        tracing::warn!(
            static_dir = ?config.paths.static_dir,
            error = %source,
            "Static root unavailable, static requests will 404"
        );
    }

    let bind_address = config.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: bind_address.clone(),
            source,
        })
        .inspect_err(|e| tracing::error!(error = %e, "Failed to bind"))?;

    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_watcher(shutdown.clone());

    let scheduler = if config.persistence.enabled {
        let saver = SnapshotSaver::new(config.clone(), server.stats(), server.rate_limiter());
        tracing::info!(path = ?saver.path(), "Persistence enabled");
        Some(
            PersistenceScheduler::new(config.persistence.interval, Arc::new(saver))
                .spawn(shutdown.subscribe()),
        )
    } else {
        tracing::info!("Persistence disabled");
        None
    };

    let result = server.run(listener, shutdown.subscribe()).await;

    shutdown.trigger();
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
