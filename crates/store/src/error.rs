// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the store crate.

use thiserror::Error;

/// Errors that can occur while talking to the shared store.
#[derive(Error, Debug)]
pub enum Error {
    /// The store URL could not be parsed or the client could not be built.
    #[error("Invalid store endpoint: {details}")]
    InvalidEndpoint {
        /// Human-readable details of the failure.
        details: String,
    },

    /// No live connection to the store exists right now.
    ///
    /// Raised when the connection manager could not be established at
    /// startup and has not been rebuilt by the probe yet.
    #[error("Store is not connected")]
    NotConnected,

    /// A store round trip failed.
    #[error("Store operation failed: {details}")]
    Operation {
        /// Human-readable details of the failure.
        details: String,
    },
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Operation {
            details: e.to_string(),
        }
    }
}
