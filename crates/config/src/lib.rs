// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the rate-limiting platform.
//!
//! This crate holds the pure configuration values shared by the limiting
//! proxy and the load generator: the limiter budget ([`LimitConfig`]), the
//! operator validation bounds, the flexible test-duration grammar, and the
//! environment-driven service settings. All merge/validate/clamp logic is
//! side-effect free so it can be exercised directly in unit tests.

pub mod duration;
pub mod error;
pub mod limits;
pub mod settings;

pub use duration::FlexDuration;
pub use error::Error;
pub use limits::{Algorithm, LimitConfig, LimitPatch, ValidationBounds};
