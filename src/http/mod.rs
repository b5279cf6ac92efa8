//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → [security policies admit or reject]
//!     → [routing classifies the path]
//!     → health.rs | proxy.rs | websocket.rs | assets
//!     → response.rs (JSON errors, relayed backend responses)
//!     → Send to client
//! ```

pub mod health;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use health::{GatewayStats, HealthReport};
pub use proxy::Upstream;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
