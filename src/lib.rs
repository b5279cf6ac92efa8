//! TunnelForge front-door gateway library.
//!
//! Sits in front of the TunnelForge backend: serves the web client from
//! disk, proxies API and websocket traffic, enforces IP, rate-limit and
//! CSRF policies, and persists gateway state on a schedule.

pub mod assets;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod persistence;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
