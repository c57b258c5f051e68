// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Limiter budget configuration: algorithm selection, merge, validate, clamp.
//!
//! A [`LimitConfig`] is an immutable value. Updates arrive as a
//! [`LimitPatch`] (any subset of fields) and are resolved against the current
//! config and the operator [`ValidationBounds`] into a fresh value, never
//! mutated in place.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The admission algorithm run by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Counter over wall-clock-aligned buckets of fixed length.
    Fixed,
    /// Weighted blend of the current and immediately previous bucket.
    Sliding,
    /// Continuously refilled reservoir drawing one unit per request.
    #[serde(alias = "token_bucket", alias = "token-bucket")]
    Token,
}

impl Algorithm {
    /// Canonical lowercase name used on the wire and in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Fixed => "fixed",
            Algorithm::Sliding => "sliding",
            Algorithm::Token => "token",
        }
    }

    /// Parses an algorithm name, accepting the aliases the HTTP surface
    /// documents (`token_bucket`, `token-bucket`). Case-insensitive.
    pub fn parse(input: &str) -> Option<Algorithm> {
        match input.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Algorithm::Fixed),
            "sliding" => Some(Algorithm::Sliding),
            "token" | "token_bucket" | "token-bucket" => Some(Algorithm::Token),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete limiter budget.
///
/// `limit`/`window_seconds` drive the two window algorithms;
/// `capacity`/`fill_rate` drive the token bucket. All four are always
/// populated so an algorithm switch never reads an unset field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitConfig {
    /// The active admission algorithm.
    pub algorithm: Algorithm,
    /// Maximum admitted requests per window.
    pub limit: u64,
    /// Window length in seconds.
    #[serde(alias = "window")]
    pub window_seconds: u64,
    /// Token bucket capacity.
    pub capacity: u64,
    /// Token bucket refill rate in tokens per second.
    pub fill_rate: f64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Fixed,
            limit: 100,
            window_seconds: 60,
            capacity: 100,
            fill_rate: 10.0,
        }
    }
}

/// A partial limiter update as received from the operator API, the advisor,
/// or the shared store.
///
/// Missing fields inherit the current config during resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitPatch {
    /// New algorithm, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    /// New per-window limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// New window length in seconds. Accepts `window` and `windowSeconds`.
    #[serde(default, alias = "windowSeconds", skip_serializing_if = "Option::is_none")]
    pub window: Option<u64>,
    /// New bucket capacity. `burst` is an accepted alias.
    #[serde(default, alias = "burst", skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    /// New refill rate in tokens per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_rate: Option<f64>,
}

impl LimitPatch {
    /// A patch that only switches the algorithm.
    pub fn algorithm_only(algorithm: Algorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            ..Self::default()
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.algorithm.is_none()
            && self.limit.is_none()
            && self.window.is_none()
            && self.capacity.is_none()
            && self.fill_rate.is_none()
    }
}

/// Operator-configured validation bounds.
///
/// Below-minimum values reject the whole update; above-maximum values are
/// clamped with a warning so an aggressive advisor cannot push the limiter
/// out of its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationBounds {
    /// Smallest accepted per-window limit.
    pub min_limit: u64,
    /// Largest accepted per-window limit.
    pub max_limit: u64,
    /// Smallest accepted window in seconds.
    pub min_window: u64,
    /// Largest accepted window in seconds.
    pub max_window: u64,
    /// Smallest accepted bucket capacity.
    pub min_capacity: u64,
    /// Largest accepted bucket capacity.
    pub max_capacity: u64,
    /// Smallest accepted refill rate.
    pub min_fill_rate: f64,
    /// Largest accepted refill rate.
    pub max_fill_rate: f64,
}

impl Default for ValidationBounds {
    fn default() -> Self {
        Self {
            min_limit: 1,
            max_limit: 1_000_000,
            min_window: 1,
            max_window: 3_600,
            min_capacity: 1,
            max_capacity: 1_000_000,
            min_fill_rate: 0.001,
            max_fill_rate: 100_000.0,
        }
    }
}

impl LimitConfig {
    /// Resolves `patch` against this config into a new validated value.
    ///
    /// Steps, in order: merge (missing fields inherit `self`), completeness
    /// check when `require_all_fields` is set (window algorithms must carry
    /// `limit` and `window`, the token bucket must carry `capacity` and
    /// `fill_rate`), then per-field validation against `bounds`. The update
    /// is all-or-nothing: any rejection leaves the caller's current config
    /// untouched.
    pub fn resolve(
        &self,
        patch: &LimitPatch,
        bounds: &ValidationBounds,
        require_all_fields: bool,
    ) -> Result<LimitConfig, Error> {
        let algorithm = patch.algorithm.unwrap_or(self.algorithm);

        if require_all_fields {
            match algorithm {
                Algorithm::Fixed | Algorithm::Sliding => {
                    if patch.limit.is_none() {
                        return Err(missing(algorithm, "limit"));
                    }
                    if patch.window.is_none() {
                        return Err(missing(algorithm, "window"));
                    }
                }
                Algorithm::Token => {
                    if patch.capacity.is_none() {
                        return Err(missing(algorithm, "capacity"));
                    }
                    if patch.fill_rate.is_none() {
                        return Err(missing(algorithm, "fillRate"));
                    }
                }
            }
        }

        let limit = clamp_u64(
            "limit",
            patch.limit.unwrap_or(self.limit),
            bounds.min_limit,
            bounds.max_limit,
        )?;
        let window_seconds = clamp_u64(
            "window",
            patch.window.unwrap_or(self.window_seconds),
            bounds.min_window,
            bounds.max_window,
        )?;
        let capacity = clamp_u64(
            "capacity",
            patch.capacity.unwrap_or(self.capacity),
            bounds.min_capacity,
            bounds.max_capacity,
        )?;
        let fill_rate = clamp_f64(
            "fillRate",
            patch.fill_rate.unwrap_or(self.fill_rate),
            bounds.min_fill_rate,
            bounds.max_fill_rate,
        )?;

        Ok(LimitConfig {
            algorithm,
            limit,
            window_seconds,
            capacity,
            fill_rate,
        })
    }
}

fn missing(algorithm: Algorithm, field: &str) -> Error {
    Error::MissingField {
        algorithm: algorithm.to_string(),
        field: field.to_string(),
    }
}

fn clamp_u64(field: &str, value: u64, min: u64, max: u64) -> Result<u64, Error> {
    if value < min {
        return Err(Error::BelowMinimum {
            field: field.to_string(),
            value: value.to_string(),
            minimum: min.to_string(),
        });
    }
    if value > max {
        tracing::warn!(field, value, maximum = max, "value above maximum, clamping");
        return Ok(max);
    }
    Ok(value)
}

fn clamp_f64(field: &str, value: f64, min: f64, max: f64) -> Result<f64, Error> {
    if !value.is_finite() {
        return Err(Error::InvalidValue {
            field: field.to_string(),
            details: "must be a finite number".to_string(),
        });
    }
    if value < min {
        return Err(Error::BelowMinimum {
            field: field.to_string(),
            value: value.to_string(),
            minimum: min.to_string(),
        });
    }
    if value > max {
        tracing::warn!(field, value, maximum = max, "value above maximum, clamping");
        return Ok(max);
    }
    Ok(value)
}
