// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the telemetry crate.

use thiserror::Error;

/// Errors that can occur while registering or exposing metrics.
#[derive(Error, Debug)]
pub enum Error {
    /// A metric could not be registered with the registry.
    #[error("Metric registration failed: {details}")]
    Registration {
        /// Human-readable details of the registration failure.
        details: String,
    },

    /// The registry contents could not be rendered as exposition text.
    #[error("Metric exposition failed: {details}")]
    Exposition {
        /// Human-readable details of the encoding failure.
        details: String,
    },
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::Registration {
            details: e.to_string(),
        }
    }
}
