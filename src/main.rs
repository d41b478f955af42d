// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use portal_sso::{api::router, config::Config, state::AppState, telemetry::init_tracing};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;
    init_tracing(config.log_format);

    info!(
        app = %config.app_name,
        portal = %config.portal_url,
        audience = %config.audience,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        key_cache = %config.public_key_path.display(),
        "Configuration loaded"
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(bind_address = %config.bind_address, "Invalid bind address: {}", e);
        e
    })?;

    let state = AppState::new(config);
    let sessions = state.sessions.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Portal SSO listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown"),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
