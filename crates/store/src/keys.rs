// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared-store key layout.
//!
//! All algorithm keys carry a TTL so state left behind by a config change or
//! an abandoned experiment ages out on its own.

/// Persisted limiter config (opaque JSON).
pub const CONFIG_KEY: &str = "ratelimiter:config";

/// Prefix of fixed-window counters; the suffix is the window id.
pub const FIXED_PREFIX: &str = "ratelimiter:fixed:";

/// Prefix of sliding-window counters; the suffix is the window start in ms.
pub const SLIDING_PREFIX: &str = "ratelimiter:sliding:";

/// Token bucket hash with fields `tokens` and `lastRefillMs`.
pub const TOKEN_KEY: &str = "ratelimiter:token";

/// Scan patterns covering every algorithm key family.
pub const ALGORITHM_PATTERNS: &[&str] = &[
    "ratelimiter:fixed:*",
    "ratelimiter:sliding:*",
    "ratelimiter:token",
];
