// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Entry point of the rate-limiting experimentation platform.
//!
//! One binary, two services: `ratelab limiter` runs the rate-limiting
//! reverse proxy, `ratelab loadgen` runs the synthetic load generator.
//! Settings come from the environment, with a few common knobs overridable
//! on the command line. Both services shut down gracefully on ctrl-c.

use clap::{Parser, Subcommand};
use ratelab_config::settings::{LimiterSettings, LoadgenSettings};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ratelab", version, about = "Rate-limiting experimentation platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rate-limiting reverse proxy.
    Limiter {
        /// Bind address, overriding LIMITER_BIND_ADDRESS.
        #[arg(long)]
        bind: Option<String>,
        /// Upstream target URL, overriding TARGET_URL.
        #[arg(long)]
        target: Option<String>,
    },
    /// Run the synthetic load generator.
    Loadgen {
        /// Bind address, overriding LOADGEN_BIND_ADDRESS.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    spawn_shutdown_watcher(cancel.clone());

    let result = match cli.command {
        Command::Limiter { bind, target } => run_limiter(bind, target, cancel).await,
        Command::Loadgen { bind } => run_loadgen(bind, cancel).await,
    };

    if let Err(details) = result {
        tracing::error!(error = %details, "service failed");
        std::process::exit(1);
    }
}

fn spawn_shutdown_watcher(cancel: CancellationToken) {
    let _ = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
            Err(e) => tracing::error!(error = %e, "shutdown signal unavailable"),
        }
    });
}

async fn run_limiter(
    bind: Option<String>,
    target: Option<String>,
    cancel: CancellationToken,
) -> Result<(), String> {
    let mut settings = LimiterSettings::from_env().map_err(|e| e.to_string())?;
    if let Some(bind) = bind {
        settings.bind_address = bind;
    }
    if let Some(target) = target {
        settings.target_url = target;
    }
    ratelab_limiter::run(settings, cancel)
        .await
        .map_err(|e| e.to_string())
}

async fn run_loadgen(bind: Option<String>, cancel: CancellationToken) -> Result<(), String> {
    let mut settings = LoadgenSettings::from_env().map_err(|e| e.to_string())?;
    if let Some(bind) = bind {
        settings.bind_address = bind;
    }
    ratelab_loadgen::run(settings, cancel)
        .await
        .map_err(|e| e.to_string())
}
