//! Per-request access log and request accounting.
//!
//! Wraps the policy middleware so rejected requests are logged too. Emits
//! exactly one record per request on the `gateway::access` target.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::http::health::GatewayStats;
use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::routing::classify;
use crate::security::policy::PolicyDecision;

#[derive(Debug, Clone)]
pub struct AccessLogState {
    pub stats: Arc<GatewayStats>,
    pub enabled: bool,
}

pub async fn access_log_middleware(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AccessLogState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req.request_id().unwrap_or("-").to_string();

    let response = next.run(req).await;

    state.stats.record_request();
    let status = response.status().as_u16();
    let class = classify(&path).as_str();
    metrics::record_request(method.as_str(), status, class, start);

    if state.enabled {
        let policy = response
            .extensions()
            .get::<PolicyDecision>()
            .map(PolicyDecision::as_str)
            .unwrap_or("none");
        tracing::info!(
            target: "gateway::access",
            request_id = %request_id,
            method = %method,
            path = %path,
            peer = %peer,
            status,
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            policy,
            class,
            "Request handled"
        );
    }

    response
}
