//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (interval tick)
//!     → SaveHook::save (detached, monitored task)
//!     → snapshot.rs (gateway-state.json via temp file + rename)
//! ```
//!
//! # Design Decisions
//! - The scheduler knows nothing about what is saved
//! - Save failures are logged and counted, never fatal

pub mod scheduler;
pub mod snapshot;

pub use scheduler::{PersistenceScheduler, SaveHook, SchedulerHandle, SchedulerState};
pub use snapshot::{GatewaySnapshot, SnapshotSaver};
