//! Locally answered endpoints: `/health` and `/csrf-token`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, TunnelsConfig};
use crate::http::response::json_error;
use crate::security::csrf::{CsrfTokens, CSRF_COOKIE};

/// Process-wide counters shared by handlers and the persistence hook.
#[derive(Debug)]
pub struct GatewayStats {
    started_at: Instant,
    requests_served: AtomicU64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_served: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// What the gateway advertises about one tunnel provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub enabled: bool,
    pub configured: bool,
}

/// Flags for every provider, keyed by provider name. Never includes credentials.
pub fn tunnel_statuses(tunnels: &TunnelsConfig) -> BTreeMap<String, TunnelStatus> {
    tunnels
        .iter()
        .map(|(provider, tunnel)| {
            (
                provider.as_str().to_string(),
                TunnelStatus {
                    enabled: tunnel.enabled,
                    configured: tunnel.has_credentials(provider),
                },
            )
        })
        .collect()
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub server: String,
    pub version: String,
    pub uptime_secs: u64,
    pub requests_served: u64,
    pub tunnels: BTreeMap<String, TunnelStatus>,
}

impl HealthReport {
    pub fn collect(config: &GatewayConfig, stats: &GatewayStats) -> Self {
        Self {
            status: "ok".to_string(),
            server: config.network.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: stats.uptime().as_secs(),
            requests_served: stats.requests_served(),
            tunnels: tunnel_statuses(&config.tunnels),
        }
    }
}

pub fn health_response(config: &GatewayConfig, stats: &GatewayStats) -> Response {
    Json(HealthReport::collect(config, stats)).into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CsrfTokenBody {
    pub csrf_token: String,
    pub header: String,
}

/// Issue a CSRF token, or 404 when CSRF protection is off.
pub fn csrf_token_response(tokens: Option<&CsrfTokens>) -> Response {
    let Some(tokens) = tokens else {
        return json_error(StatusCode::NOT_FOUND, "CSRF protection is disabled", None);
    };

    let token = tokens.issue();
    let cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict");
    let mut response = Json(CsrfTokenBody {
        csrf_token: token,
        header: "X-CSRF-Token".to_string(),
    })
    .into_response();

    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
