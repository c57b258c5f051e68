// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared-store access for the rate-limiting platform.
//!
//! The store (Redis) is the only cross-replica mutable state. Every
//! decision-path mutation is a single server-side Lua script so the
//! check-and-mutate sequence stays race-free across limiter replicas; this
//! crate owns those scripts, the connection handle with its rebuildable
//! manager, the availability latch and probe, and the per-algorithm
//! key-family reset used on algorithm switches.

pub mod error;
pub mod handle;
pub mod keys;
pub mod probe;
pub mod reset;
pub mod scripts;

pub use error::Error;
pub use handle::StoreHandle;
pub use probe::{Availability, run_probe};
pub use scripts::DecisionScripts;
