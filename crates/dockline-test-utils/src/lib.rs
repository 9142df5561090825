#![deny(unsafe_code)]

//! Shared test utilities for the Dockline workspace.
//!
//! Provides a mock Docker daemon and config builders so that individual
//! crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! dockline-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;

pub use config::TestConfigBuilder;
pub use daemon::{MockDaemon, RecordedRequest, mux_frame};
