// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Store availability latch and health probe.
//!
//! The latch is a plain atomic: the decision hot path reads it with a
//! single load and must never wait on the probe. The probe pings on a
//! fixed period, logs only on edge transitions, and rebuilds the connection
//! manager while the store is down.

use crate::handle::StoreHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Store availability latch.
///
/// Written by the probe and by the decision engine on store errors; read
/// everywhere else.
pub struct Availability {
    available: AtomicBool,
}

impl Availability {
    /// Creates the latch in the available state; the first failed probe or
    /// decision flips it.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    /// Current state, one atomic load.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Sets the state and reports whether this call was an edge transition,
    /// so callers log once instead of on every observation.
    pub fn set(&self, available: bool) -> bool {
        self.available.swap(available, Ordering::Relaxed) != available
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the periodic health probe until cancelled.
pub async fn run_probe(
    handle: Arc<StoreHandle>,
    availability: Arc<Availability>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }

        match handle.ping().await {
            Ok(()) => {
                if availability.set(true) {
                    tracing::info!("store available, enforcement resumed");
                }
            }
            Err(e) => {
                if availability.set(false) {
                    tracing::warn!(error = %e, "store unavailable, failing open");
                }
                // A stale manager will not heal a dead TCP session; rebuild
                // it so the next ping runs against a fresh connection.
                if let Err(rebuild_err) = handle.rebuild_connection().await {
                    tracing::debug!(error = %rebuild_err, "store connection rebuild failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_reports_edges_once() {
        let availability = Availability::new();
        assert!(availability.is_available());
        // Same-state writes are not edges.
        assert!(!availability.set(true));
        // The first flip is an edge, repeats are not.
        assert!(availability.set(false));
        assert!(!availability.set(false));
        assert!(!availability.is_available());
        assert!(availability.set(true));
        assert!(availability.is_available());
    }
}
