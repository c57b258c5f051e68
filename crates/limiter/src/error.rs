// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the limiter service.

use thiserror::Error;

/// Errors that can occur while starting or running the limiter service.
#[derive(Error, Debug)]
pub enum Error {
    /// The configured bind address is invalid and could not be parsed.
    #[error("Invalid bind address '{bind_address}': {details}")]
    InvalidBindAddress {
        /// The bind address that failed to parse.
        bind_address: String,
        /// Human-readable details of the parsing failure.
        details: String,
    },

    /// Failed to bind the TCP listener on the given address.
    #[error("Failed to bind limiter HTTP server on '{addr}': {details}")]
    BindFailed {
        /// The address we attempted to bind to.
        addr: String,
        /// Human-readable details of the bind failure.
        details: String,
    },

    /// The HTTP server encountered a fatal error while serving.
    #[error("Limiter HTTP server error on '{addr}': {details}")]
    ServerError {
        /// The address the server was bound to.
        addr: String,
        /// Human-readable details of the server failure.
        details: String,
    },

    /// The metric set could not be registered.
    #[error("Telemetry setup failed: {details}")]
    Telemetry {
        /// Human-readable details of the failure.
        details: String,
    },

    /// The store endpoint could not be parsed.
    #[error("Store setup failed: {details}")]
    Store {
        /// Human-readable details of the failure.
        details: String,
    },

    /// The shared proxy/advisor HTTP client could not be built.
    #[error("HTTP client setup failed: {details}")]
    HttpClient {
        /// Human-readable details of the failure.
        details: String,
    },
}
