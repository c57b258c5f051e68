// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Process-local metrics and traffic aggregation.
//!
//! Each service owns one [`prometheus::Registry`] threaded explicitly into
//! the components that record into it; there are no global statics. The
//! [`traffic::TrafficStats`] accumulator feeds the adaptive loop, while the
//! prometheus counters/histograms back the `/actuator/prometheus` surface.

pub mod error;
pub mod expose;
pub mod latency;
pub mod metrics;
pub mod traffic;

pub use error::Error;
pub use latency::LatencyHistogram;
pub use metrics::{LimiterMetrics, LoadgenCounts, LoadgenMetrics};
pub use traffic::{TrafficSnapshot, TrafficStats};
