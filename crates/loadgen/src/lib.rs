// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The synthetic load generator service.
//!
//! Assembles the profile engine, the scheduler, the dispatcher pool, and
//! the test control API. One test runs at a time; traffic is shaped by a
//! parametric profile and sent through a shared HTTP client.

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod profile;
pub mod scheduler;

use crate::api::ApiState;
use crate::error::Error;
use crate::manager::{LoadTestManager, StartRequest};
use axum::Router;
use ratelab_config::settings::LoadgenSettings;
use ratelab_telemetry::LoadgenMetrics;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Builds the load-generator HTTP surface.
pub fn app(state: ApiState) -> Router {
    Router::new().merge(api::routes()).with_state(state)
}

/// Runs the load generator service until the cancellation token fires.
pub async fn run(settings: LoadgenSettings, cancel: CancellationToken) -> Result<(), Error> {
    let metrics = LoadgenMetrics::new().map_err(|e| Error::Telemetry {
        details: e.to_string(),
    })?;
    let client = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .build()
        .map_err(|e| Error::HttpClient {
            details: e.to_string(),
        })?;
    let manager = Arc::new(LoadTestManager::new(
        settings.clone(),
        metrics.clone(),
        client,
    ));

    if let Some(path) = settings.config_file.as_deref() {
        auto_start(&manager, path);
    }

    let state = ApiState {
        manager,
        metrics,
    };
    let app = app(state);

    let addr = settings
        .bind_address
        .parse::<SocketAddr>()
        .map_err(|e| Error::InvalidBindAddress {
            bind_address: settings.bind_address.clone(),
            details: format!("{e}"),
        })?;
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::BindFailed {
            addr: addr.to_string(),
            details: format!("{e}"),
        })?;

    tracing::info!(endpoint = %addr, "load generator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .map_err(|e| Error::ServerError {
            addr: addr.to_string(),
            details: format!("{e}"),
        })
}

/// Applies the start request from `LOADGEN_CONFIG_FILE` at boot.
///
/// Failures are logged and the service keeps serving; a broken auto-start
/// file must not take the control API down with it.
fn auto_start(manager: &Arc<LoadTestManager>, path: &Path) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "auto-start config unreadable");
            return;
        }
    };
    let request: StartRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "auto-start config unparseable");
            return;
        }
    };
    match manager.start(request) {
        Ok(test_id) => {
            tracing::info!(test_id = %test_id, path = %path.display(), "auto-started load test");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "auto-start rejected");
        }
    }
}
