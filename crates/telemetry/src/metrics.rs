// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric sets for the two services.
//!
//! Counter names are part of the public contract: scenario tooling scrapes
//! them from `/actuator/prometheus`, and the load-test status endpoint
//! derives per-test numbers from baseline snapshots of the same counters.

use crate::error::Error;
use crate::latency::LatencyHistogram;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Latency buckets for request-duration histograms, in seconds.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Latency buckets for store round trips, in seconds.
const STORE_BUCKETS: &[f64] = &[
    0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5,
];

/// Metric set of the limiting proxy.
#[derive(Clone)]
pub struct LimiterMetrics {
    /// The registry all limiter metrics are registered with.
    pub registry: Registry,
    /// Admitted decisions.
    pub forwarded: IntCounter,
    /// Denied decisions.
    pub rejected: IntCounter,
    /// Decisions partitioned by algorithm and outcome.
    pub decisions: IntCounterVec,
    /// Store operations that failed on the decision path.
    pub store_errors: IntCounter,
    /// Store round-trip latency.
    pub store_op_duration: Histogram,
    /// End-to-end proxy request latency.
    pub request_duration: Histogram,
    /// Mirror of `request_duration` with an in-process quantile path,
    /// feeding the adaptive loop's p95.
    pub latency: Arc<LatencyHistogram>,
    /// Forwarded requests whose upstream send failed.
    pub upstream_errors: IntCounter,
}

impl LimiterMetrics {
    /// Creates and registers the limiter metric set on a fresh registry.
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();
        let forwarded = IntCounter::new(
            "ratelimiter_forwarded_total",
            "Requests admitted by the decision engine",
        )?;
        let rejected = IntCounter::new(
            "ratelimiter_rejected_total",
            "Requests denied by the decision engine",
        )?;
        let decisions = IntCounterVec::new(
            Opts::new(
                "ratelimiter_decisions_total",
                "Decisions partitioned by algorithm and outcome",
            ),
            &["algorithm", "outcome"],
        )?;
        let store_errors = IntCounter::new(
            "ratelimiter_store_errors_total",
            "Store operations that failed on the decision path",
        )?;
        let store_op_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ratelimiter_store_op_duration_seconds",
                "Latency of atomic decision operations against the shared store",
            )
            .buckets(STORE_BUCKETS.to_vec()),
        )?;
        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "proxy_request_duration_seconds",
                "End-to-end latency of proxied requests",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let upstream_errors = IntCounter::new(
            "proxy_upstream_errors_total",
            "Admitted requests whose upstream forward failed",
        )?;

        registry.register(Box::new(forwarded.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(store_op_duration.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;

        Ok(Self {
            registry,
            forwarded,
            rejected,
            decisions,
            store_errors,
            store_op_duration,
            request_duration,
            latency: Arc::new(LatencyHistogram::new(LATENCY_BUCKETS)),
            upstream_errors,
        })
    }

    /// Records the end-to-end latency of one proxied request.
    pub fn observe_request(&self, seconds: f64) {
        self.request_duration.observe(seconds);
        self.latency.observe(seconds);
    }

    /// Current p95 of the request-duration histogram, zero when empty.
    pub fn latency_p95(&self) -> f64 {
        self.latency.quantile(0.95).unwrap_or(0.0)
    }

    /// Records one admit/deny decision under the given algorithm.
    pub fn record_decision(&self, algorithm: &str, allowed: bool) {
        let outcome = if allowed { "forwarded" } else { "rejected" };
        if allowed {
            self.forwarded.inc();
        } else {
            self.rejected.inc();
        }
        self.decisions.with_label_values(&[algorithm, outcome]).inc();
    }

    /// Records one failed store operation.
    pub fn record_store_error(&self) {
        self.store_errors.inc();
    }
}

/// Per-test counter snapshot used as a baseline at test start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadgenCounts {
    /// Dispatches handed to the sender pool.
    pub started: u64,
    /// Dispatches classified as success (2xx).
    pub success: u64,
    /// Dispatches classified as rate limited (429).
    pub rate_limited: u64,
    /// Dispatches classified as error (everything else).
    pub errors: u64,
}

/// Metric set of the load generator.
#[derive(Clone)]
pub struct LoadgenMetrics {
    /// The registry all load-generator metrics are registered with.
    pub registry: Registry,
    /// Dispatches handed to the sender pool.
    pub dispatches_started: IntCounter,
    /// Completed dispatches partitioned by classification.
    pub outcomes: IntCounterVec,
    /// Outbound request latency.
    pub request_duration: Histogram,
    /// Dispatches currently in flight.
    pub in_flight: IntGauge,
}

impl LoadgenMetrics {
    /// Creates and registers the load-generator metric set on a fresh registry.
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();
        let dispatches_started = IntCounter::new(
            "loadgen_dispatches_started_total",
            "Requests handed to the sender pool",
        )?;
        let outcomes = IntCounterVec::new(
            Opts::new(
                "loadgen_requests_total",
                "Completed dispatches partitioned by classification",
            ),
            &["outcome"],
        )?;
        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "loadgen_request_duration_seconds",
                "Latency of outbound load-generator requests",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let in_flight = IntGauge::new("loadgen_in_flight", "Dispatches currently in flight")?;

        registry.register(Box::new(dispatches_started.clone()))?;
        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            dispatches_started,
            outcomes,
            request_duration,
            in_flight,
        })
    }

    /// Records a completed dispatch under the given classification label.
    pub fn record_outcome(&self, outcome: &str, seconds: f64) {
        self.outcomes.with_label_values(&[outcome]).inc();
        self.request_duration.observe(seconds);
    }

    /// Snapshot of the monotone counters, used as a per-test baseline.
    pub fn counts(&self) -> LoadgenCounts {
        LoadgenCounts {
            started: self.dispatches_started.get(),
            success: self.outcomes.with_label_values(&["success"]).get(),
            rate_limited: self.outcomes.with_label_values(&["rate_limited"]).get(),
            errors: self.outcomes.with_label_values(&["error"]).get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_counters_stay_consistent() {
        let metrics = LimiterMetrics::new().expect("metrics");
        metrics.record_decision("fixed", true);
        metrics.record_decision("fixed", true);
        metrics.record_decision("fixed", false);
        assert_eq!(metrics.forwarded.get(), 2);
        assert_eq!(metrics.rejected.get(), 1);
        assert_eq!(
            metrics.forwarded.get() + metrics.rejected.get(),
            metrics
                .decisions
                .with_label_values(&["fixed", "forwarded"])
                .get()
                + metrics
                    .decisions
                    .with_label_values(&["fixed", "rejected"])
                    .get()
        );
    }

    #[test]
    fn loadgen_counts_subtract_as_baselines() {
        let metrics = LoadgenMetrics::new().expect("metrics");
        metrics.dispatches_started.inc();
        metrics.record_outcome("success", 0.01);
        let baseline = metrics.counts();

        metrics.dispatches_started.inc();
        metrics.record_outcome("rate_limited", 0.01);
        let now = metrics.counts();

        assert_eq!(now.started - baseline.started, 1);
        assert_eq!(now.rate_limited - baseline.rate_limited, 1);
        assert_eq!(now.success - baseline.success, 0);
    }
}
