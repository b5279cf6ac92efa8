//! Policy enforcement middleware.
//!
//! Runs the [`PolicyEngine`] against every request before routing. Rejected
//! requests are answered here; admitted ones continue with the bypass
//! header removed unless the caller qualified for the local bypass.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::json_error;
use crate::observability::metrics;
use crate::security::policy::{
    LocalPrincipal, PolicyDecision, PolicyEngine, RequestMeta, LOCAL_BYPASS_HEADER,
};

pub async fn policy_middleware(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(policy): State<Arc<PolicyEngine>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let decision = policy.evaluate(&RequestMeta {
        peer: peer.ip(),
        method: req.method(),
        headers: req.headers(),
    });

    if decision.is_rejection() {
        metrics::record_policy_rejection(decision.as_str());
        tracing::warn!(
            peer = %peer,
            method = %req.method(),
            path = %req.uri().path(),
            policy = decision.as_str(),
            "Request rejected by policy"
        );
        let mut response = rejection_response(decision);
        response.extensions_mut().insert(decision);
        return response;
    }

    if decision == PolicyDecision::BypassAuth {
        tracing::debug!(peer = %peer, "Local bypass accepted");
        req.extensions_mut().insert(LocalPrincipal::default());
    } else {
        req.headers_mut().remove(LOCAL_BYPASS_HEADER);
    }
    req.extensions_mut().insert(decision);

    let mut response = next.run(req).await;
    response.extensions_mut().insert(decision);
    response
}

/// HTTP answer for a rejecting decision.
pub fn rejection_response(decision: PolicyDecision) -> Response {
    let label = Some(decision.as_str());
    match decision {
        PolicyDecision::RejectByIp => json_error(StatusCode::FORBIDDEN, "access denied", label),
        PolicyDecision::RejectByCsrf => {
            json_error(StatusCode::FORBIDDEN, "invalid or missing CSRF token", label)
        }
        PolicyDecision::RejectByRateLimit { retry_after } => {
            let mut response =
                json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded", label);
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            response
        }
        PolicyDecision::Allow | PolicyDecision::BypassAuth => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "not a rejection", None)
        }
    }
}
