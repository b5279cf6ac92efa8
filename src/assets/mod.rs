//! Static asset subsystem.
//!
//! Serves the web client from the configured static root. Requests the
//! router classifies as `Static` or `Shell` end up here.

pub mod static_files;

pub use static_files::{StaticAssets, SHELL_FILE};
