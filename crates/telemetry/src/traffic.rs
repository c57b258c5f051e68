// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-interval traffic aggregation feeding the adaptive loop.
//!
//! The hot path is `record_decision`, called for every proxied request; it
//! must stay wait-free, so the accumulator is three atomics. Draining
//! divides by real wall-clock elapsed since the previous drain, never by the
//! nominal tick interval, so a delayed tick cannot inflate the observed
//! rate.

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One drained interval of traffic, as posted to the advisor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSnapshot {
    /// Decisions per second over the drained interval.
    pub observed_rps: f64,
    /// Fraction of decisions that were denied; 0 when there was no traffic.
    pub rejected_rate: f64,
    /// Upstream 5xx responses observed in the interval.
    pub errors_5xx: u64,
    /// p95 of the request-duration histogram, in seconds.
    pub latency_p95: f64,
}

/// Wait-free traffic accumulator.
pub struct TrafficStats {
    total: AtomicU64,
    rejected: AtomicU64,
    errors_5xx: AtomicU64,
    last_drain: Mutex<Instant>,
}

impl TrafficStats {
    /// Creates an empty accumulator with the drain clock starting now.
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            errors_5xx: AtomicU64::new(0),
            last_drain: Mutex::new(Instant::now()),
        }
    }

    /// Records one decision and, for admitted requests, the upstream status.
    pub fn record_decision(&self, allowed: bool, status: u16) {
        let _ = self.total.fetch_add(1, Ordering::Relaxed);
        if !allowed {
            let _ = self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        if status >= 500 {
            let _ = self.errors_5xx.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drains the accumulator into a snapshot.
    ///
    /// `fallback_interval` substitutes for a non-positive elapsed time (two
    /// drains racing on the same instant) and is floored at one second.
    /// `latency_p95` is the current request-duration histogram quantile,
    /// read by the caller from its metric set.
    pub fn snapshot_and_reset(
        &self,
        fallback_interval: Duration,
        latency_p95: f64,
    ) -> TrafficSnapshot {
        let total = self.total.swap(0, Ordering::Relaxed);
        let rejected = self.rejected.swap(0, Ordering::Relaxed);
        let errors_5xx = self.errors_5xx.swap(0, Ordering::Relaxed);

        let now = Instant::now();
        let mut last = self.last_drain.lock().expect("traffic drain lock");
        let mut elapsed = now.duration_since(*last);
        *last = now;
        drop(last);

        if elapsed.is_zero() {
            elapsed = fallback_interval.max(Duration::from_secs(1));
        }

        let observed_rps = total as f64 / elapsed.as_secs_f64();
        let rejected_rate = if total == 0 {
            0.0
        } else {
            rejected as f64 / total as f64
        };

        TrafficSnapshot {
            observed_rps,
            rejected_rate,
            errors_5xx,
            latency_p95,
        }
    }

    /// Discards the accumulated interval without producing a snapshot.
    ///
    /// The adaptive loop calls this when it is re-enabled mid-run so the
    /// first posted snapshot reflects only post-enable traffic.
    pub fn reset_snapshot_state(&self) {
        let _ = self.total.swap(0, Ordering::Relaxed);
        let _ = self.rejected.swap(0, Ordering::Relaxed);
        let _ = self.errors_5xx.swap(0, Ordering::Relaxed);
        let mut last = self.last_drain.lock().expect("traffic drain lock");
        *last = Instant::now();
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_rejections_and_5xx() {
        let stats = TrafficStats::new();
        stats.record_decision(true, 200);
        stats.record_decision(true, 502);
        stats.record_decision(false, 429);
        let snap = stats.snapshot_and_reset(Duration::from_secs(30), 0.0);
        assert!((snap.rejected_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(snap.errors_5xx, 1);
        assert!(snap.observed_rps > 0.0);
    }

    #[test]
    fn back_to_back_snapshots_drain_to_zero() {
        let stats = TrafficStats::new();
        stats.record_decision(true, 200);
        let _ = stats.snapshot_and_reset(Duration::from_secs(30), 0.0);
        let snap = stats.snapshot_and_reset(Duration::from_secs(30), 0.0);
        assert_eq!(snap.observed_rps, 0.0);
        assert_eq!(snap.rejected_rate, 0.0);
        assert_eq!(snap.errors_5xx, 0);
    }

    #[test]
    fn reset_discards_accumulated_traffic() {
        let stats = TrafficStats::new();
        stats.record_decision(false, 429);
        stats.record_decision(false, 429);
        stats.reset_snapshot_state();
        let snap = stats.snapshot_and_reset(Duration::from_secs(30), 0.0);
        assert_eq!(snap.rejected_rate, 0.0);
    }

    #[test]
    fn snapshot_serializes_contract_field_names() {
        let snap = TrafficSnapshot {
            observed_rps: 1.5,
            rejected_rate: 0.25,
            errors_5xx: 2,
            latency_p95: 0.125,
        };
        let json = serde_json::to_value(snap).expect("serialize");
        assert!(json.get("observedRps").is_some());
        assert!(json.get("rejectedRate").is_some());
        assert!(json.get("errors5xx").is_some());
        assert!(json.get("latencyP95").is_some());
    }
}
