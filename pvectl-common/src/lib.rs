//! # pvectl Common
//!
//! Shared utilities for the pvectl components.
//!
//! ## Logging
//!
//! ```no_run
//! use pvectl_common::init_logging;
//!
//! // Initialize with level; RUST_LOG overrides it when set
//! init_logging("info").unwrap();
//! tracing::info!(upid = "UPID:pve1:...", "Task submitted");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json};
