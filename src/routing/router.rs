//! Request classification.
//!
//! # Responsibilities
//! - Hold the ordered classification table
//! - Map a request path to exactly one [`RouteClass`]
//!
//! # Design Decisions
//! - Immutable table (thread-safe without locks)
//! - O(n) scan over a handful of entries
//! - First match wins; the last entry matches everything

use crate::routing::matcher::PathPattern;

/// Where a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Gateway liveness, answered locally.
    Health,
    /// CSRF token issuance, answered locally.
    CsrfToken,
    /// WebSocket endpoints proxied to the backend.
    WebSocket,
    /// Backend API.
    Api,
    /// File under the static root.
    Static,
    /// Client-side route, answered with `index.html`.
    Shell,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Health => "health",
            RouteClass::CsrfToken => "csrf_token",
            RouteClass::WebSocket => "websocket",
            RouteClass::Api => "api",
            RouteClass::Static => "static",
            RouteClass::Shell => "shell",
        }
    }
}

pub const STATIC_PREFIXES: &[&str] = &[
    "/bundle/", "/styles/", "/assets/", "/fonts/", "/icons/", "/images/",
];

pub const STATIC_FILES: &[&str] = &["/favicon.ico", "/sw.js", "/manifest.json", "/robots.txt"];

pub const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff",
    "woff2", "ttf", "webmanifest", "wasm", "txt",
];

/// Ordered classification table.
pub const ROUTES: &[(PathPattern, RouteClass)] = &[
    (PathPattern::Exact(&["/health", "/api/health"]), RouteClass::Health),
    (PathPattern::Exact(&["/csrf-token"]), RouteClass::CsrfToken),
    (PathPattern::Exact(&["/ws", "/buffers"]), RouteClass::WebSocket),
    (PathPattern::Exact(&["/api"]), RouteClass::Api),
    (PathPattern::Prefix(&["/api/"]), RouteClass::Api),
    (PathPattern::Prefix(STATIC_PREFIXES), RouteClass::Static),
    (PathPattern::Exact(STATIC_FILES), RouteClass::Static),
    (PathPattern::Extension(STATIC_EXTENSIONS), RouteClass::Static),
    (PathPattern::Any, RouteClass::Shell),
];

/// Classify a request path against [`ROUTES`].
pub fn classify(path: &str) -> RouteClass {
    ROUTES
        .iter()
        .find(|(pattern, _)| pattern.matches(path))
        .map(|(_, class)| *class)
        .unwrap_or(RouteClass::Shell)
}
