// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The rate-limiting reverse proxy service.
//!
//! Assembles the decision engine, the live config store with its refresh
//! loop, the store availability probe, the adaptive reconfiguration loop,
//! and the HTTP surface: operator config endpoints plus a catch-all proxy
//! handler forwarding admitted traffic to the configured target.

pub mod adaptive;
pub mod api;
pub mod config_store;
pub mod engine;
pub mod error;
pub mod proxy;

use crate::adaptive::{AdaptiveHandle, AdaptiveLoop};
use crate::config_store::{ConfigStore, run_refresh};
use crate::engine::DecisionEngine;
use crate::error::Error;
use crate::proxy::ProxyState;
use axum::Router;
use ratelab_config::settings::LimiterSettings;
use ratelab_store::{Availability, StoreHandle, run_probe};
use ratelab_telemetry::{LimiterMetrics, TrafficStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Connect timeout of the shared upstream client.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Request timeout of the shared upstream client.
const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the limiter HTTP surface: operator routes plus the catch-all
/// proxy fallback.
pub fn app(state: ProxyState) -> Router {
    Router::new()
        .merge(api::routes())
        .fallback(proxy::proxy_request)
        .with_state(state)
}

/// Runs the limiter service until the cancellation token fires.
pub async fn run(settings: LimiterSettings, cancel: CancellationToken) -> Result<(), Error> {
    let metrics = LimiterMetrics::new().map_err(|e| Error::Telemetry {
        details: e.to_string(),
    })?;

    let store = Arc::new(
        StoreHandle::connect(&settings.store.url())
            .await
            .map_err(|e| Error::Store {
                details: e.to_string(),
            })?,
    );
    let availability = Arc::new(Availability::new());

    let config_store = Arc::new(ConfigStore::new(
        settings.defaults,
        settings.bounds,
        store.clone(),
    ));
    // Adopt a config persisted by a previous run or another replica.
    config_store.refresh().await;

    let engine = Arc::new(DecisionEngine::new(
        store.clone(),
        availability.clone(),
        metrics.clone(),
        settings.fail_open,
    ));
    let stats = Arc::new(TrafficStats::new());
    let adaptive_handle = Arc::new(AdaptiveHandle::new(settings.adaptive.enabled));

    let upstream_client = reqwest::Client::builder()
        .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
        .timeout(UPSTREAM_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::HttpClient {
            details: e.to_string(),
        })?;
    let advisor_client = reqwest::Client::builder()
        .timeout(settings.adaptive.timeout)
        .build()
        .map_err(|e| Error::HttpClient {
            details: e.to_string(),
        })?;

    let _ = tokio::spawn(run_probe(
        store.clone(),
        availability.clone(),
        settings.store.probe_interval,
        cancel.child_token(),
    ));
    let _ = tokio::spawn(run_refresh(
        config_store.clone(),
        availability.clone(),
        settings.refresh_interval,
        cancel.child_token(),
    ));
    let adaptive_loop = AdaptiveLoop {
        settings: settings.adaptive.clone(),
        handle: adaptive_handle.clone(),
        stats: stats.clone(),
        metrics: metrics.clone(),
        config_store: config_store.clone(),
        availability: availability.clone(),
        client: advisor_client,
    };
    let _ = tokio::spawn(adaptive_loop.run(cancel.child_token()));

    let state = ProxyState {
        engine,
        config: config_store,
        stats,
        metrics,
        adaptive: adaptive_handle,
        client: upstream_client,
        target_url: settings.target_url.clone(),
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

    tracing::info!(
        endpoint = %addr,
        target = %settings.target_url,
        fail_open = settings.fail_open,
        "limiter listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        cancel.cancelled().await;
    })
    .await
    .map_err(|e| Error::ServerError {
        addr: addr.to_string(),
        details: format!("{e}"),
    })
}
