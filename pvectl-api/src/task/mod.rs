//! Asynchronous remote-task tracking.
//!
//! A mutating call either finishes on the server before it answers, or the
//! server queues the work and answers with a task identifier (UPID). Both
//! cases are exposed through the [`Task`] trait:
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  dyn Task    │
//!                 └──────┬───────┘
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!   ┌─────────────────┐     ┌─────────────────┐
//!   │   RemoteTask    │     │    NullTask     │
//!   │ poller + log    │     │ fixed outcome   │
//!   │ fetcher loops   │     │ no network      │
//!   └─────────────────┘     └─────────────────┘
//! ```
//!
//! `RemoteTask` polls the status endpoint from construction on and pages the
//! log only once someone asks for it. Accessors wait for the data they need
//! through one-shot [`Signal`]s; background failures end up in an
//! [`ErrorCell`] and surface from [`Task::ended`], [`Task::wait_for_completion`]
//! and [`Task::log_stream`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::TaskError;

mod error_cell;
mod log;
mod null;
mod remote;
mod signal;
mod status;
mod upid;

pub use error_cell::ErrorCell;
pub use log::FINAL_LINE_PREFIX;
pub use null::NullTask;
pub use remote::RemoteTask;
pub use signal::Signal;
pub use status::{is_success_exit, TaskStatus};
pub use upid::{Upid, UPID_PREFIX};

/// Capabilities shared by every kind of task.
#[async_trait]
pub trait Task: Send + Sync {
    // =========================================================================
    // Identity (never waits)
    // =========================================================================

    /// Task identifier; empty when there is no server-side task.
    fn id(&self) -> &str;

    fn node(&self) -> &str;

    fn operation_type(&self) -> &str;

    fn user(&self) -> &str;

    // =========================================================================
    // Status (waits for the first status)
    // =========================================================================

    /// Copy of the last known status.
    async fn snapshot(&self) -> TaskStatus;

    /// Server-side state, `running` or `stopped`.
    async fn status(&self) -> String;

    /// Exit status, once the task has finished.
    async fn exit_status(&self) -> Option<String>;

    async fn process_id(&self) -> Option<u64>;

    async fn start_time(&self) -> Option<DateTime<Utc>>;

    async fn end_time(&self) -> Option<DateTime<Utc>>;

    /// Whether the task has finished. Returns the stored error, if any.
    async fn ended(&self) -> Result<bool, TaskError>;

    // =========================================================================
    // Log
    // =========================================================================

    /// Ordered copy of the log lines fetched so far. May be incomplete while
    /// the task is still running.
    async fn log(&self) -> Vec<String>;

    /// Ordered stream of log lines that follows the task until it is done.
    /// A stored error is yielded as the last item.
    fn log_stream(&self) -> BoxStream<'_, Result<String, TaskError>>;

    // =========================================================================
    // Completion
    // =========================================================================

    /// Wait until the task has finished and, if its log was requested,
    /// until the whole log has been fetched.
    async fn wait_for_completion(&self) -> Result<(), TaskError>;

    /// Ask the server to stop the task and release every waiter.
    async fn cancel(&self) -> Result<(), TaskError>;
}
