//! Shared countdown timer service
//!
//! # Servers
//!
//! - WebSocket gateway for browser clients (default: 0.0.0.0:9001)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`SessionControllerActorHandle`)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Start WebSocket gateway and mark ready
//! 6. Wait for shutdown signal, then drain

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use timer_service::actors::{ActorMetrics, SessionControllerActorHandle};
use timer_service::config::Config;
use timer_service::gateway::ws_router;
use timer_service::observability::{health_router, init_metrics_recorder, HealthState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on how long the actor system gets to stop.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timer_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timer service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        tick_interval_seconds = config.tick_interval_seconds,
        pin_penalty_ms = config.pin_penalty_ms,
        max_sessions = config.max_sessions,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    let actor_metrics = ActorMetrics::new();
    let controller = SessionControllerActorHandle::new(
        config.instance_id.clone(),
        config.registry_settings(),
        Arc::clone(&actor_metrics),
    );
    info!("Actor system initialized");

    // Child of the controller's token: cancelling the controller stops the servers too
    let shutdown_token = controller.child_token();

    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Bind listeners BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let ws_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid WebSocket bind address");
        format!("Invalid WebSocket bind address: {e}")
    })?;
    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await.map_err(|e| {
        error!(error = %e, addr = %ws_addr, "Failed to bind WebSocket gateway");
        format!("Failed to bind WebSocket gateway to {ws_addr}: {e}")
    })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    let ws_shutdown_token = shutdown_token.child_token();
    let ws_app = ws_router(controller.clone());
    tokio::spawn(async move {
        info!(addr = %ws_addr, "WebSocket gateway starting");
        let server = axum::serve(ws_listener, ws_app).with_graceful_shutdown(async move {
            ws_shutdown_token.cancelled().await;
            info!("WebSocket gateway shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "WebSocket gateway failed");
        }
    });

    health_state.set_ready();
    info!("Timer service running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    if config.drain_seconds > 0 {
        info!(drain_seconds = config.drain_seconds, "Draining before shutdown");
        tokio::time::sleep(Duration::from_secs(config.drain_seconds)).await;
    }

    if let Err(e) = controller.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Actor system shutdown error");
    }
    shutdown_token.cancel();

    info!(
        sessions = actor_metrics.session_count(),
        connections = actor_metrics.connection_count(),
        "Timer service shutdown complete"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
