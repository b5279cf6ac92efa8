//! Response construction helpers.
//!
//! # Responsibilities
//! - Build the JSON error bodies every locally generated failure uses
//! - Relay backend responses with hop-by-hop headers removed
//!
//! # Design Decisions
//! - Error bodies are always `{"error": "..."}`, plus `"policy"` for
//!   policy rejections
//! - Backend status, headers and body are otherwise passed through untouched
//! - A relayed body that stalls between frames is cut off

use std::time::Duration;

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tower_http::timeout::TimeoutBody;

use crate::security::headers::strip_hop_by_hop;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<&'a str>,
}

/// JSON error response with an optional policy label.
pub fn json_error(status: StatusCode, message: &str, policy: Option<&str>) -> Response {
    let body = ErrorBody {
        error: message,
        policy,
    };
    (status, Json(body)).into_response()
}

/// Convert a backend response into one for the client.
///
/// The body errors once no frame arrives within `idle`, which aborts the
/// client connection instead of holding it open.
pub fn relay(response: hyper::Response<hyper::body::Incoming>, idle: Duration) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(TimeoutBody::new(idle, body)))
}
