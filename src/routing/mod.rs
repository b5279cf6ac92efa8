//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request (path)
//!     → router.rs (ordered table scan)
//!     → matcher.rs (evaluate path patterns)
//!     → Return: RouteClass
//! ```
//!
//! # Design Decisions
//! - Table is static data, immutable at runtime
//! - No regex in hot path (exact, prefix and extension matching only)
//! - Deterministic: same path always yields the same class
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{classify, RouteClass};
