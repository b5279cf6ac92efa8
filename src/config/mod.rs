//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → loader.rs (per-field parse, default on failure)
//!     → validation.rs (semantic warnings, never fatal)
//!     → GatewayConfig (immutable snapshot)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Built once at startup; nothing reads the environment afterwards
//! - Every field has a default and is resolved independently
//! - A bad value is logged and replaced, it never aborts startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, log_issues, parse_duration, ParseIssue};
pub use schema::{
    AuthConfig, GatewayConfig, LogFormat, NetworkConfig, ObservabilityConfig, PathsConfig,
    PersistenceConfig, SecurityConfig, SessionConfig, TunnelConfig, TunnelProvider, TunnelsConfig,
};
pub use validation::{validate, ConfigWarning};
