//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (middleware, runs policy.rs)
//!         → ip_allow.rs (peer inside an allowed CIDR?)
//!         → rate_limit.rs (sliding window per peer IP)
//!         → csrf.rs (token on state-changing methods)
//!         → local bypass (loopback peer + X-TunnelForge-Local)
//!     → Pass to routing
//! Outgoing:
//!     → headers.rs (hop-by-hop strip, X-Forwarded-*, security headers)
//! ```
//!
//! # Design Decisions
//! - Fixed order, first rejection wins
//! - Fail closed: reject on any security check failure
//! - No trust in client-supplied forwarding headers

pub mod access_control;
pub mod csrf;
pub mod headers;
pub mod ip_allow;
pub mod policy;
pub mod rate_limit;

pub use access_control::policy_middleware;
pub use policy::{LocalPrincipal, PolicyDecision, PolicyEngine, RequestMeta, LOCAL_BYPASS_HEADER};
pub use rate_limit::RateLimiter;
