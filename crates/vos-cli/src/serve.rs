//! # Serve CLI Subcommand
//!
//! Runs the automation core as a service:
//!
//! 1. Load configuration and apply `VOS_*` environment overrides.
//! 2. Build the runtime (fact log replay, rules, registry, targets).
//! 3. Start the event bus and subscribe the rules engine.
//! 4. Start the timer source, unless disabled.
//! 5. Serve the HTTP API until Ctrl-C or SIGTERM.
//! 6. Stop the timers, then drain the bus.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::sync::watch;
use vos_api::AppState;
use vos_bus::EventBus;
use vos_runtime::{RulesHandler, Runtime, RuntimeConfig};

use crate::source::SourceArgs;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address. Overrides `api.bind` and `VOS_API_BIND`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Do not start the timer source.
    #[arg(long)]
    pub no_timers: bool,
}

/// The effective configuration for `serve`: file, then environment, then
/// flags.
pub fn serve_config(args: &ServeArgs, source: &SourceArgs) -> Result<RuntimeConfig> {
    let mut config = source.runtime_config()?;
    config.apply_env();
    if let Some(bind) = &args.bind {
        config.api.bind = bind.clone();
    }
    if args.no_timers {
        config.timers.enabled = false;
    }
    if config.timers.enabled && config.timers.tick_ms == 0 {
        bail!("timers.tick_ms must be greater than zero");
    }
    Ok(config)
}

pub async fn run_serve(args: &ServeArgs, source: &SourceArgs) -> Result<u8> {
    let config = serve_config(args, source)?;
    let runtime = Runtime::from_config(&config).context("failed to start runtime")?;

    let bus = Arc::new(EventBus::new(config.bus.clone()));
    bus.subscribe(Arc::new(RulesHandler::new(runtime.clone())))?;

    let (stop_timers, timers_stopped) = watch::channel(false);
    let timers = config.timers.enabled.then(|| {
        let tick = Duration::from_millis(config.timers.tick_ms);
        tokio::spawn(config.timers.source().run(Arc::clone(&bus), tick, timers_stopped))
    });

    let state = AppState::new(runtime)
        .with_bus(Arc::clone(&bus))
        .with_auth_token(config.api.auth_token.clone());
    if state.auth_token.is_none() {
        tracing::warn!("no auth token configured; the API is unauthenticated");
    }

    let listener = TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.api.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "vos API listening");

    let served = axum::serve(listener, vos_api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down");
    let _ = stop_timers.send(true);
    if let Some(timers) = timers {
        if let Err(e) = timers.await {
            tracing::error!(error = %e, "timer task failed");
        }
    }
    bus.shutdown().await;

    served.context("HTTP server failed")?;
    Ok(0)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
