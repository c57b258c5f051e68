// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The adaptive reconfiguration loop.
//!
//! Every tick: drain the traffic accumulator, post the snapshot plus the
//! current config to the advisor, and apply whatever it recommends through
//! the config store. Everything the advisor does wrong (unreachable,
//! non-2xx, unparseable, out-of-bounds recommendation) degrades to
//! keeping the current config at warn level.
//!
//! The first tick after an enable transition discards the stale accumulator
//! instead of posting, so the advisor never sees an interval that partly
//! predates the enable.

use crate::config_store::{ConfigStore, SOURCE_ADAPTIVE};
use ratelab_config::settings::AdaptiveSettings;
use ratelab_config::{LimitConfig, LimitPatch};
use ratelab_store::Availability;
use ratelab_telemetry::{LimiterMetrics, TrafficSnapshot, TrafficStats};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Runtime toggle for the adaptive loop.
///
/// The loop itself only reads; the operator API writes.
pub struct AdaptiveHandle {
    enabled: AtomicBool,
}

impl AdaptiveHandle {
    /// Creates the handle with the startup state.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Whether the loop currently posts to the advisor.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables the loop.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Telemetry payload posted to the advisor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvisorRequest {
    timestamp: String,
    observed_rps: f64,
    rejected_rate: f64,
    latency_p95: f64,
    #[serde(rename = "errors5xx")]
    errors_5xx: u64,
    algorithm: String,
    limit: u64,
    window: u64,
    capacity: u64,
    fill_rate: f64,
}

impl AdvisorRequest {
    fn new(snapshot: TrafficSnapshot, config: LimitConfig) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            observed_rps: snapshot.observed_rps,
            rejected_rate: snapshot.rejected_rate,
            latency_p95: snapshot.latency_p95,
            errors_5xx: snapshot.errors_5xx,
            algorithm: config.algorithm.to_string(),
            limit: config.limit,
            window: config.window_seconds,
            capacity: config.capacity,
            fill_rate: config.fill_rate,
        }
    }
}

/// Everything one adaptive tick needs.
pub struct AdaptiveLoop {
    /// Loop settings (interval, timeout, advisor URL).
    pub settings: AdaptiveSettings,
    /// Runtime enable toggle.
    pub handle: Arc<AdaptiveHandle>,
    /// Traffic accumulator drained each posting tick.
    pub stats: Arc<TrafficStats>,
    /// Metric set providing the latency p95.
    pub metrics: LimiterMetrics,
    /// Config store recommendations are applied through.
    pub config_store: Arc<ConfigStore>,
    /// Store availability; ticks are skipped while the store is down.
    pub availability: Arc<Availability>,
    /// Shared advisor client with the post timeout configured.
    pub client: reqwest::Client,
}

impl AdaptiveLoop {
    /// Runs the loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        // Start disabled-edge-pending so an initially enabled loop also
        // discards whatever accumulated before the first tick.
        let mut was_enabled = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.settings.interval) => {}
            }
            self.tick(&mut was_enabled).await;
        }
    }

    async fn tick(&self, was_enabled: &mut bool) {
        let enabled = self.handle.is_enabled();
        if enabled && !*was_enabled {
            *was_enabled = true;
            self.stats.reset_snapshot_state();
            tracing::info!("adaptive loop enabled, discarding stale telemetry");
            return;
        }
        *was_enabled = enabled;
        if !enabled {
            return;
        }
        if !self.availability.is_available() {
            tracing::debug!("store unavailable, skipping adaptive tick");
            return;
        }
        let Some(url) = self.settings.advisor_url.as_deref() else {
            tracing::warn!("adaptive loop enabled but no advisor URL configured");
            return;
        };

        let snapshot = self
            .stats
            .snapshot_and_reset(self.settings.interval, self.metrics.latency_p95());
        let request = AdvisorRequest::new(snapshot, self.config_store.get());

        let response = match self.client.post(url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "advisor unreachable, keeping current config");
                return;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "advisor returned an error status");
            return;
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "advisor response body unreadable");
                return;
            }
        };
        if body.is_empty() {
            return;
        }
        let patch: LimitPatch = match serde_json::from_slice(&body) {
            Ok(patch) => patch,
            Err(e) => {
                tracing::warn!(error = %e, "advisor response is not a valid recommendation");
                return;
            }
        };
        if patch.is_empty() {
            return;
        }

        if let Err(e) = self
            .config_store
            .apply(&patch, SOURCE_ADAPTIVE, true)
            .await
        {
            tracing::warn!(error = %e, "advisor recommendation rejected");
        }
    }
}
