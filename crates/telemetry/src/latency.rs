// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-bucket latency histogram with a lock-free quantile path.
//!
//! The prometheus histogram types do not expose their bucket counts to the
//! process that owns them, only to scrapers. The adaptive loop needs a p95
//! in-process every tick, so request latencies are mirrored into this
//! cumulative atomic-bucket histogram and the quantile is interpolated from
//! its snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative fixed-bucket histogram over `f64` observations.
pub struct LatencyHistogram {
    bounds: Vec<f64>,
    /// Cumulative counts per bound, plus a trailing +Inf bucket.
    buckets: Vec<AtomicU64>,
}

impl LatencyHistogram {
    /// Creates a histogram over the given ascending bucket upper bounds.
    pub fn new(bounds: &[f64]) -> Self {
        let mut buckets = Vec::with_capacity(bounds.len() + 1);
        for _ in 0..=bounds.len() {
            buckets.push(AtomicU64::new(0));
        }
        Self {
            bounds: bounds.to_vec(),
            buckets,
        }
    }

    /// Records one observation.
    pub fn observe(&self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.bounds.len());
        // Cumulative layout: every bucket at or above the value counts it.
        for bucket in &self.buckets[idx..] {
            let _ = bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total number of observations.
    pub fn count(&self) -> u64 {
        self.buckets
            .last()
            .map(|b| b.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Interpolated quantile estimate, `None` when empty.
    ///
    /// Ranks beyond the last finite bucket report that bucket's upper bound,
    /// which is as precise as the layout allows.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        let target = q.clamp(0.0, 1.0) * count as f64;

        let mut prev_cumulative = 0u64;
        let mut prev_bound = 0.0f64;
        for (i, bound) in self.bounds.iter().enumerate() {
            let cumulative = self.buckets[i].load(Ordering::Relaxed);
            if cumulative as f64 >= target {
                let in_bucket = cumulative - prev_cumulative;
                if in_bucket == 0 {
                    return Some(*bound);
                }
                let fraction = (target - prev_cumulative as f64) / in_bucket as f64;
                return Some(prev_bound + (bound - prev_bound) * fraction);
            }
            prev_cumulative = cumulative;
            prev_bound = *bound;
        }
        Some(prev_bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_inside_bucket() {
        let histogram = LatencyHistogram::new(&[0.1, 0.2, 0.4]);
        for _ in 0..100 {
            histogram.observe(0.15);
        }
        let p95 = histogram.quantile(0.95).expect("p95");
        assert!((p95 - 0.195).abs() < 1e-9, "got {p95}");
    }

    #[test]
    fn quantile_is_none_when_empty() {
        let histogram = LatencyHistogram::new(&[0.1, 0.2]);
        assert!(histogram.quantile(0.95).is_none());
    }

    #[test]
    fn quantile_caps_at_last_finite_bucket() {
        let histogram = LatencyHistogram::new(&[0.1, 0.2, 0.4]);
        histogram.observe(5.0);
        let p95 = histogram.quantile(0.95).expect("p95");
        assert!((p95 - 0.4).abs() < 1e-9, "got {p95}");
    }

    #[test]
    fn count_tracks_observations() {
        let histogram = LatencyHistogram::new(&[1.0]);
        histogram.observe(0.5);
        histogram.observe(2.0);
        assert_eq!(histogram.count(), 2);
    }
}
