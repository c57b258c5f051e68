// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The admit/deny decision engine.
//!
//! One decision is exactly one atomic script invocation against the shared
//! store, or no store contact at all when the availability latch is down.
//! Store failures never surface to the caller: the request is decided by
//! the fail-open policy and the latch flips so subsequent decisions skip
//! the store until the probe sees it healthy again.

use ratelab_config::{Algorithm, LimitConfig};
use ratelab_store::error::Error as StoreError;
use ratelab_store::{Availability, DecisionScripts, StoreHandle};
use ratelab_telemetry::LimiterMetrics;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Decision engine over the shared store.
pub struct DecisionEngine {
    store: Arc<StoreHandle>,
    scripts: DecisionScripts,
    availability: Arc<Availability>,
    metrics: LimiterMetrics,
    fail_open: bool,
}

impl DecisionEngine {
    /// Creates an engine sharing the store handle and availability latch
    /// with the probe.
    pub fn new(
        store: Arc<StoreHandle>,
        availability: Arc<Availability>,
        metrics: LimiterMetrics,
        fail_open: bool,
    ) -> Self {
        Self {
            store,
            scripts: DecisionScripts::new(),
            availability,
            metrics,
            fail_open,
        }
    }

    /// Decides one request under the given config.
    pub async fn allow(&self, config: &LimitConfig) -> bool {
        if !self.availability.is_available() {
            let allowed = self.fail_open;
            self.metrics.record_decision(config.algorithm.as_str(), allowed);
            return allowed;
        }

        let started = Instant::now();
        let allowed = match self.check(config).await {
            Ok(allowed) => {
                self.metrics
                    .store_op_duration
                    .observe(started.elapsed().as_secs_f64());
                if self.availability.set(true) {
                    tracing::info!("store available, enforcement resumed");
                }
                allowed
            }
            Err(e) => {
                self.metrics.record_store_error();
                if self.availability.set(false) {
                    tracing::warn!(error = %e, "store operation failed, failing open");
                }
                self.fail_open
            }
        };

        self.metrics.record_decision(config.algorithm.as_str(), allowed);
        allowed
    }

    async fn check(&self, config: &LimitConfig) -> Result<bool, StoreError> {
        let mut conn = self.store.connection()?;
        let now_ms = unix_millis();
        match config.algorithm {
            Algorithm::Fixed => {
                self.scripts
                    .check_fixed(&mut conn, config.limit, config.window_seconds, now_ms)
                    .await
            }
            Algorithm::Sliding => {
                self.scripts
                    .check_sliding(&mut conn, config.limit, config.window_seconds, now_ms)
                    .await
            }
            Algorithm::Token => {
                self.scripts
                    .check_token(&mut conn, config.capacity, config.fill_rate)
                    .await
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
