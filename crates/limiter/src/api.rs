// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Operator endpoints of the limiter.
//!
//! - GET  `/config/limits` - current limiter config
//! - POST `/config/limits` - full limiter update (all fields of the target
//!   algorithm required)
//! - POST `/config/algorithm` - switch algorithm, via body or query param
//! - POST `/config/adaptive` - enable/disable the adaptive loop
//! - GET  `/actuator/prometheus` - metrics exposition
//!
//! Bodies are parsed by hand from bytes so malformed JSON answers `400`
//! with the parse error instead of the extractor's default status.

use crate::config_store::SOURCE_API;
use crate::proxy::ProxyState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ratelab_config::{Algorithm, LimitPatch};
use ratelab_telemetry::expose;
use serde::Deserialize;

/// All operator routes of the limiter.
pub(crate) fn routes() -> Router<ProxyState> {
    Router::new()
        .route("/config/limits", get(get_limits).post(update_limits))
        .route("/config/algorithm", post(update_algorithm))
        .route("/config/adaptive", post(update_adaptive))
        .route("/actuator/prometheus", get(prometheus))
}

async fn get_limits(State(state): State<ProxyState>) -> Response {
    Json(state.config.get()).into_response()
}

async fn update_limits(State(state): State<ProxyState>, body: Bytes) -> Response {
    let patch: LimitPatch = match serde_json::from_slice(&body) {
        Ok(patch) => patch,
        Err(e) => return bad_request(format!("invalid limits payload: {e}")),
    };
    match state.config.apply(&patch, SOURCE_API, true).await {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AlgorithmQuery {
    algorithm: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlgorithmBody {
    algorithm: String,
}

async fn update_algorithm(
    State(state): State<ProxyState>,
    Query(query): Query<AlgorithmQuery>,
    body: Bytes,
) -> Response {
    // Body wins over query param when both are present.
    let name = if body.is_empty() {
        match query.algorithm {
            Some(name) => name,
            None => return bad_request("algorithm missing from body and query".to_string()),
        }
    } else {
        match serde_json::from_slice::<AlgorithmBody>(&body) {
            Ok(parsed) => parsed.algorithm,
            Err(e) => return bad_request(format!("invalid algorithm payload: {e}")),
        }
    };

    let Some(algorithm) = Algorithm::parse(&name) else {
        return bad_request(format!("unknown algorithm '{name}'"));
    };
    match state.config.apply_algorithm(algorithm).await {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct AdaptiveBody {
    enabled: bool,
}

async fn update_adaptive(State(state): State<ProxyState>, body: Bytes) -> Response {
    let parsed: AdaptiveBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => return bad_request(format!("invalid adaptive payload: {e}")),
    };
    state.adaptive.set_enabled(parsed.enabled);
    tracing::info!(enabled = parsed.enabled, "adaptive loop toggled");
    Json(serde_json::json!({ "enabled": parsed.enabled })).into_response()
}

async fn prometheus(State(state): State<ProxyState>) -> Response {
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

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveHandle;
    use crate::config_store::ConfigStore;
    use crate::engine::DecisionEngine;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use ratelab_config::{LimitConfig, ValidationBounds};
    use ratelab_store::{Availability, StoreHandle};
    use ratelab_telemetry::{LimiterMetrics, TrafficStats};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let store = Arc::new(
            StoreHandle::connect("redis://127.0.0.1:1/")
                .await
                .expect("handle"),
        );
        let availability = Arc::new(Availability::new());
        let metrics = LimiterMetrics::new().expect("metrics");
        let config = Arc::new(ConfigStore::new(
            LimitConfig::default(),
            ValidationBounds::default(),
            store.clone(),
        ));
        let state = ProxyState {
            engine: Arc::new(DecisionEngine::new(
                store,
                availability,
                metrics.clone(),
                true,
            )),
            config,
            stats: Arc::new(TrafficStats::new()),
            metrics,
            adaptive: Arc::new(AdaptiveHandle::new(false)),
            client: reqwest::Client::new(),
            target_url: "http://127.0.0.1:1".to_string(),
        };
        routes().with_state(state)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn get_limits_returns_current_config() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/config/limits")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["algorithm"], "fixed");
        assert_eq!(json["limit"], 100);
        assert!(json.get("windowSeconds").is_some());
    }

    #[tokio::test]
    async fn update_limits_resolves_full_update() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/limits")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"limit": 300, "window": 30}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["limit"], 300);
        assert_eq!(json["windowSeconds"], 30);
    }

    #[tokio::test]
    async fn update_limits_rejects_incomplete_payload() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/limits")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"limit": 300}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_limits_rejects_malformed_json() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/limits")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_algorithm_accepts_query_param_and_aliases() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/algorithm?algorithm=token_bucket")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["algorithm"], "token");
    }

    #[tokio::test]
    async fn update_algorithm_accepts_body() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/algorithm")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"algorithm": "sliding"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["algorithm"], "sliding");
    }

    #[tokio::test]
    async fn update_algorithm_rejects_unknown_name() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/algorithm?algorithm=leaky")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn prometheus_endpoint_exposes_limiter_metrics() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/actuator/prometheus")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.contains("ratelimiter_forwarded_total"));
    }

    #[tokio::test]
    async fn adaptive_toggle_round_trips() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config/adaptive")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"enabled": true}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["enabled"], true);
    }
}
