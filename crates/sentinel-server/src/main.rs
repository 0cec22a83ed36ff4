// crates/sentinel-server/src/main.rs
// ============================================================================
// Module: Sentinel Server Entrypoint
// Description: Process bootstrap: tracing, configuration, the dependency
// container, and the scheduler loop.
// Purpose: The single process entrypoint for the compliance engine daemon.
// Dependencies: sentinel-config, sentinel-server, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! Startup order is deliberate: tracing first (so every later failure logs
//! somewhere), then configuration (fails closed on a malformed file), then
//! the dependency container (fails closed on an unreachable storage
//! backend), then the startup health gate, then the scheduler loop. A fatal
//! condition raised mid-run cancels the same token the shutdown signal
//! cancels, so both paths converge on one clean exit.

use std::process::ExitCode;

use sentinel_config::SentinelConfig;
use sentinel_server::Container;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match SentinelConfig::load(None) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let container = match Container::bootstrap(&config).await {
        Ok(container) => container,
        Err(err) => {
            tracing::error!(error = %err, "failed to bootstrap dependency container");
            return ExitCode::FAILURE;
        }
    };

    if let Err(condition) = container.health.check_startup().await {
        tracing::error!(error = %condition, "startup health check failed");
        return ExitCode::FAILURE;
    }

    let shutdown = CancellationToken::new();
    let fatal = CancellationToken::new();

    let scheduler = container.scheduler.clone();
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone(), fatal.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to install ctrl-c handler");
            }
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
        () = fatal.cancelled() => {
            tracing::error!("fatal condition observed, shutting down");
        }
    }

    if let Err(err) = scheduler_handle.await {
        tracing::error!(error = %err, "scheduler task panicked");
        return ExitCode::FAILURE;
    }

    if fatal.is_cancelled() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
