// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The reverse-proxy data path.
//!
//! Every inbound request is decided first; denied requests are answered
//! `429` locally and never reach the upstream. Admitted requests are
//! forwarded through one shared client with hop-by-hop headers stripped and
//! `X-Forwarded-For` appended. Upstream failures surface as `502`.

use crate::config_store::ConfigStore;
use crate::engine::DecisionEngine;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ratelab_telemetry::{LimiterMetrics, TrafficStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Headers that are connection-scoped and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Body answered on denied requests.
const DENIED_BODY: &str = "Rate limit exceeded";

/// Shared state of the limiter HTTP surface.
#[derive(Clone)]
pub struct ProxyState {
    /// The decision engine.
    pub engine: Arc<DecisionEngine>,
    /// The live limiter config.
    pub config: Arc<ConfigStore>,
    /// Traffic accumulator for the adaptive loop.
    pub stats: Arc<TrafficStats>,
    /// Limiter metric set.
    pub metrics: LimiterMetrics,
    /// Runtime toggle for the adaptive loop.
    pub adaptive: Arc<crate::adaptive::AdaptiveHandle>,
    /// Shared upstream client.
    pub client: reqwest::Client,
    /// Upstream base URL.
    pub target_url: String,
}

/// Fallback handler covering every method and path not claimed by the
/// config API.
pub async fn proxy_request(
    State(state): State<ProxyState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let started = Instant::now();
    let config = state.config.get();

    if !state.engine.allow(&config).await {
        state.stats.record_decision(false, StatusCode::TOO_MANY_REQUESTS.as_u16());
        state
            .metrics
            .observe_request(started.elapsed().as_secs_f64());
        return (StatusCode::TOO_MANY_REQUESTS, DENIED_BODY).into_response();
    }

    let response = match forward(&state, remote, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "upstream request failed");
            state.metrics.upstream_errors.inc();
            (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
        }
    };

    state
        .stats
        .record_decision(true, response.status().as_u16());
    state
        .metrics
        .observe_request(started.elapsed().as_secs_f64());
    response
}

async fn forward(
    state: &ProxyState,
    remote: SocketAddr,
    request: Request,
) -> Result<Response, reqwest::Error> {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return Ok(StatusCode::BAD_REQUEST.into_response()),
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!(
        "{}{}",
        state.target_url.trim_end_matches('/'),
        path_and_query
    );

    let mut headers = strip_hop_by_hop(parts.headers);
    if let Ok(value) = HeaderValue::from_str(&remote.ip().to_string()) {
        let _ = headers.append("x-forwarded-for", value);
    }

    let upstream = state
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let response_headers = strip_hop_by_hop(upstream.headers().clone());
    let response_body = upstream.bytes().await?;

    let mut builder = Response::builder().status(status);
    if let Some(target) = builder.headers_mut() {
        *target = response_headers;
    }
    Ok(builder
        .body(Body::from(response_body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
}

fn strip_hop_by_hop(headers: HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let _ = out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderName;

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("connection", HeaderValue::from_static("keep-alive"));
        let _ = headers.insert("host", HeaderValue::from_static("limiter.local"));
        let _ = headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        let _ = headers.insert("accept", HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("abc"),
        );

        let out = strip_hop_by_hop(headers);
        assert!(out.get("connection").is_none());
        assert!(out.get("host").is_none());
        assert!(out.get("transfer-encoding").is_none());
        assert_eq!(out.get("accept").map(|v| v.as_bytes()), Some(&b"application/json"[..]));
        assert!(out.get("x-request-id").is_some());
    }

    #[test]
    fn duplicate_headers_survive_filtering() {
        let mut headers = HeaderMap::new();
        let _ = headers.append("x-tag", HeaderValue::from_static("a"));
        let _ = headers.append("x-tag", HeaderValue::from_static("b"));
        let out = strip_hop_by_hop(headers);
        assert_eq!(out.get_all("x-tag").iter().count(), 2);
    }
}
