//! Error types shared across the gateway.
//!
//! Only startup errors are fatal. Everything on the request path is mapped
//! to an HTTP response; configuration parse problems never reach here.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::http::response::json_error;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Static serving is mandatory but the root is unreadable.
    #[error("static root {path:?} is not a readable directory: {source}")]
    StaticRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend origin could not be turned into a proxy target.
    #[error("invalid backend origin {0:?}")]
    BackendOrigin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while forwarding a request to the backend.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connection refused, reset, DNS failure and friends.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// The backend did not answer within the upstream timeout.
    #[error("upstream timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The rewritten target URI was not valid.
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    /// The websocket handshake with the backend failed.
    #[error("upstream websocket handshake failed: {0}")]
    Handshake(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unreachable(_) | ProxyError::Handshake(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidTarget(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short reason used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Unreachable(_) => "unreachable",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::Handshake(_) => "handshake",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match &self {
            ProxyError::Unreachable(_) => "upstream unreachable",
            ProxyError::Timeout(_) => "upstream timed out",
            ProxyError::InvalidTarget(_) => "invalid upstream target",
            ProxyError::Handshake(_) => "upstream websocket handshake failed",
        };
        json_error(self.status(), message, None)
    }
}

/// A failed persistence save. Logged by the scheduler, never propagated.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to write snapshot to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Metrics exporter failures at startup. Non-fatal.
#[derive(Debug, Error)]
#[error("metrics exporter on {addr} failed: {reason}")]
pub struct MetricsError {
    pub addr: SocketAddr,
    pub reason: String,
}
