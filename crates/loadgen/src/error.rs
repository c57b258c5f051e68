// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the load generator service.

use thiserror::Error;

/// Errors that can occur while controlling or running load tests.
#[derive(Error, Debug)]
pub enum Error {
    /// A start request arrived while a test is running.
    #[error("A load test is already running (id {test_id})")]
    AlreadyRunning {
        /// Id of the running test.
        test_id: String,
    },

    /// A stop request arrived with no test running.
    #[error("No load test is running")]
    NotRunning,

    /// A start request failed validation.
    #[error("Invalid test configuration: {details}")]
    InvalidRequest {
        /// Human-readable details of the rejection.
        details: String,
    },

    /// A profile carried parameters outside its declared ranges.
    #[error("Invalid profile: {details}")]
    InvalidProfile {
        /// Human-readable details of the rejection.
        details: String,
    },

    /// The scheduler worker died without completing its test.
    #[error("Scheduler failed: {details}")]
    Scheduler {
        /// Human-readable details of the failure.
        details: String,
    },

    /// The configured bind address is invalid and could not be parsed.
    #[error("Invalid bind address '{bind_address}': {details}")]
    InvalidBindAddress {
        /// The bind address that failed to parse.
        bind_address: String,
        /// Human-readable details of the parsing failure.
        details: String,
    },

    /// Failed to bind the TCP listener on the given address.
    #[error("Failed to bind load generator HTTP server on '{addr}': {details}")]
    BindFailed {
        /// The address we attempted to bind to.
        addr: String,
        /// Human-readable details of the bind failure.
        details: String,
    },

    /// The HTTP server encountered a fatal error while serving.
    #[error("Load generator HTTP server error on '{addr}': {details}")]
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

    /// The shared outbound HTTP client could not be built.
    #[error("HTTP client setup failed: {details}")]
    HttpClient {
        /// Human-readable details of the failure.
        details: String,
    },

    /// The auto-start config file could not be read or parsed.
    #[error("Auto-start config '{path}' unusable: {details}")]
    AutoStart {
        /// Path of the config file.
        path: String,
        /// Human-readable details of the failure.
        details: String,
    },
}
