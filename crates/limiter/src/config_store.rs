// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The live limiter config and its update paths.
//!
//! The current [`LimitConfig`] sits behind an [`ArcSwap`]; the decision hot
//! path reads it with a single atomic load. Updates from the operator API,
//! the advisor, and the shared store all funnel through [`ConfigStore::apply`],
//! which validates all-or-nothing, triggers the algorithm-state reset on
//! algorithm transitions, swaps, and persists best effort.

use arc_swap::ArcSwap;
use ratelab_config::error::Error as ConfigError;
use ratelab_config::{Algorithm, LimitConfig, LimitPatch, ValidationBounds};
use ratelab_store::{Availability, StoreHandle, reset};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Update source tag carried into log events.
pub const SOURCE_API: &str = "api";
/// Update source for advisor recommendations.
pub const SOURCE_ADAPTIVE: &str = "adaptive";
/// Update source for configs adopted from the shared store.
pub const SOURCE_STORE: &str = "store";

/// Holder of the current limiter config.
pub struct ConfigStore {
    current: ArcSwap<LimitConfig>,
    bounds: ValidationBounds,
    store: Arc<StoreHandle>,
}

impl ConfigStore {
    /// Creates the store with the startup config.
    pub fn new(initial: LimitConfig, bounds: ValidationBounds, store: Arc<StoreHandle>) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            bounds,
            store,
        }
    }

    /// The current config, one atomic load.
    pub fn get(&self) -> LimitConfig {
        **self.current.load()
    }

    /// Resolves and installs an update.
    ///
    /// Validation is all-or-nothing; a rejected patch leaves the current
    /// config untouched. On an algorithm transition the per-algorithm store
    /// state is reset before the swap; reset failures are logged and do not
    /// block the swap, because the new algorithm is correct against
    /// residual state too, just less efficient. Persistence to the shared
    /// store is best effort.
    pub async fn apply(
        &self,
        patch: &LimitPatch,
        source: &str,
        require_all_fields: bool,
    ) -> Result<LimitConfig, ConfigError> {
        let current = self.get();
        let next = current.resolve(patch, &self.bounds, require_all_fields)?;

        if next.algorithm != current.algorithm {
            tracing::info!(
                from = current.algorithm.as_str(),
                to = next.algorithm.as_str(),
                source,
                "algorithm switch, resetting shared state"
            );
            if let Err(e) = reset::reset_algorithm_state(&self.store).await {
                tracing::warn!(
                    error = %e,
                    "state reset failed; new algorithm starts with residual state"
                );
            }
        }

        self.current.store(Arc::new(next));
        tracing::info!(
            source,
            algorithm = next.algorithm.as_str(),
            limit = next.limit,
            window_seconds = next.window_seconds,
            capacity = next.capacity,
            fill_rate = next.fill_rate,
            "limiter config applied"
        );

        if source != SOURCE_STORE {
            self.persist(&next).await;
        }
        Ok(next)
    }

    /// Switches the algorithm, inheriting every numeric field.
    pub async fn apply_algorithm(&self, algorithm: Algorithm) -> Result<LimitConfig, ConfigError> {
        self.apply(&LimitPatch::algorithm_only(algorithm), SOURCE_API, false)
            .await
    }

    /// Adopts the persisted config when it differs from the current one.
    pub async fn refresh(&self) {
        let raw = match self.store.fetch_config().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "persisted config fetch failed");
                return;
            }
        };
        let persisted: LimitConfig = match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "persisted config is not parseable, ignoring");
                return;
            }
        };
        if persisted == self.get() {
            return;
        }
        let patch = full_patch(&persisted);
        if let Err(e) = self.apply(&patch, SOURCE_STORE, false).await {
            tracing::warn!(error = %e, "persisted config rejected by validation");
        }
    }

    async fn persist(&self, config: &LimitConfig) {
        let json = match serde_json::to_string(config) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "config serialization failed, not persisting");
                return;
            }
        };
        if let Err(e) = self.store.persist_config(&json).await {
            tracing::warn!(error = %e, "config persistence failed");
        }
    }
}

fn full_patch(config: &LimitConfig) -> LimitPatch {
    LimitPatch {
        algorithm: Some(config.algorithm),
        limit: Some(config.limit),
        window: Some(config.window_seconds),
        capacity: Some(config.capacity),
        fill_rate: Some(config.fill_rate),
    }
}

/// Runs the periodic persisted-config refresh until cancelled.
///
/// Skipped while the store is unavailable; the next healthy tick picks up
/// whatever is persisted then.
pub async fn run_refresh(
    config_store: Arc<ConfigStore>,
    availability: Arc<Availability>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
        if !availability.is_available() {
            continue;
        }
        config_store.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn disconnected_config_store() -> ConfigStore {
        let store = Arc::new(
            StoreHandle::connect("redis://127.0.0.1:1/")
                .await
                .expect("handle"),
        );
        ConfigStore::new(LimitConfig::default(), ValidationBounds::default(), store)
    }

    #[tokio::test]
    async fn apply_swaps_and_survives_persistence_failure() {
        let config_store = disconnected_config_store().await;
        let patch = LimitPatch {
            limit: Some(500),
            ..LimitPatch::default()
        };
        let next = config_store
            .apply(&patch, SOURCE_API, false)
            .await
            .expect("apply");
        assert_eq!(next.limit, 500);
        assert_eq!(config_store.get().limit, 500);
    }

    #[tokio::test]
    async fn rejected_patch_leaves_config_untouched() {
        let config_store = disconnected_config_store().await;
        let before = config_store.get();
        let patch = LimitPatch {
            limit: Some(0),
            ..LimitPatch::default()
        };
        assert!(config_store.apply(&patch, SOURCE_API, false).await.is_err());
        assert_eq!(config_store.get(), before);
    }

    #[tokio::test]
    async fn same_algorithm_apply_keeps_state() {
        // Switching to the already-active algorithm must not trigger the
        // state reset; with a dead store a reset attempt would be the only
        // observable difference, so this passing without log noise is the
        // behavior under test.
        let config_store = disconnected_config_store().await;
        let current = config_store.get();
        let next = config_store
            .apply_algorithm(current.algorithm)
            .await
            .expect("apply");
        assert_eq!(next, current);
    }
}
