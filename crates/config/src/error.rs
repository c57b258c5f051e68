// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the config crate.

use thiserror::Error;

/// Errors that can occur while parsing or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A field carried a value that cannot be accepted.
    #[error("Invalid value for '{field}': {details}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Human-readable details of the rejection.
        details: String,
    },

    /// A field was below the operator-configured minimum.
    ///
    /// Below-minimum values are rejected outright, unlike above-maximum
    /// values which are clamped.
    #[error("Value {value} for '{field}' is below the minimum {minimum}")]
    BelowMinimum {
        /// The offending field.
        field: String,
        /// The rejected value.
        value: String,
        /// The configured minimum.
        minimum: String,
    },

    /// A required field was absent from a full-update request.
    #[error("Algorithm '{algorithm}' requires field '{field}'")]
    MissingField {
        /// The algorithm the update resolves to.
        algorithm: String,
        /// The field the request must carry for that algorithm.
        field: String,
    },

    /// A duration string did not match any of the accepted grammars.
    #[error("Invalid duration '{input}': {details}")]
    InvalidDuration {
        /// The raw input.
        input: String,
        /// Why it was rejected.
        details: String,
    },

    /// An environment variable held an unparseable value.
    #[error("Invalid environment value for {key}: {details}")]
    InvalidEnv {
        /// The environment variable name.
        key: String,
        /// Why it was rejected.
        details: String,
    },
}
