// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Operator endpoints of the load generator.
//!
//! - POST `/test/start` - start a load test (`409` when one is running)
//! - POST `/test/stop` - stop the running test (`404` when idle)
//! - GET  `/test/status` - running state and per-test numbers
//! - GET  `/actuator/prometheus` - metrics exposition
//!
//! Bodies are parsed by hand from bytes so malformed JSON answers `400`
//! with the parse error instead of the extractor's default status.

use crate::error::Error;
use crate::manager::{LoadTestManager, StartRequest};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ratelab_telemetry::{LoadgenMetrics, expose};
use std::sync::Arc;

/// Shared state of the load-generator HTTP surface.
#[derive(Clone)]
pub struct ApiState {
    /// The single-test manager.
    pub manager: Arc<LoadTestManager>,
    /// Load-generator metric set.
    pub metrics: LoadgenMetrics,
}

/// All operator routes of the load generator.
pub(crate) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/test/start", post(start_test))
        .route("/test/stop", post(stop_test))
        .route("/test/status", get(test_status))
        .route("/actuator/prometheus", get(prometheus))
}

async fn start_test(State(state): State<ApiState>, body: Bytes) -> Response {
    let request: StartRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid start request: {e}"))
                .into_response();
        }
    };
    match state.manager.start(request) {
        Ok(test_id) => Json(serde_json::json!({
            "status": "started",
            "testId": test_id,
        }))
        .into_response(),
        Err(e @ Error::AlreadyRunning { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn stop_test(State(state): State<ApiState>) -> Response {
    match state.manager.stop() {
        Ok(test_id) => Json(serde_json::json!({
            "status": "stopped",
            "testId": test_id,
        }))
        .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn test_status(State(state): State<ApiState>) -> Response {
    Json(state.manager.status()).into_response()
}

async fn prometheus(State(state): State<ApiState>) -> Response {
    match expose::render(&state.metrics.registry) {
        Ok(text) => (
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
