//! # pvectl API
//!
//! Client for a hypervisor management REST API, centred on tracking the
//! long-running tasks that mutating calls start on the server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Client                  │
//! │   (submit, attach, list_tasks, get)     │
//! └─────────────────────┬───────────────────┘
//!                       │  Arc<dyn Task>
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │    RemoteTask     │     │     NullTask      │
//! │ (status + log)    │     │ (sync outcome)    │
//! └─────────┬─────────┘     └───────────────────┘
//!           │
//!           ▼
//! ┌─────────────────────────────────────────┐
//! │          ApiTransport trait             │
//! │  HttpTransport (reqwest) │ MockTransport│
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pvectl_api::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load("/etc/pvectl/config.yaml")?;
//!     let client = Client::new(&config)?;
//!
//!     let task = client.submit("nodes/pve1/qemu/100/status/start", &Vec::new()).await?;
//!     task.wait_for_completion().await?;
//!     for line in task.log().await {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod task;
pub mod traits;

pub use client::{Client, TaskSummary, VersionInfo};
pub use config::{ClientConfig, TaskConfig, CANCEL_TIMEOUT, DEFAULT_CONFIG_PATH};
pub use error::{ApiError, TaskError, UpidError};
pub use http::HttpTransport;
pub use mock::{MockMethod, MockTask, MockTransport};
pub use task::{NullTask, RemoteTask, Task, TaskStatus, Upid};
pub use traits::{ApiTransport, OperationOutcome, Params};
