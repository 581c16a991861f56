//! Transport abstraction consumed by the client and the task tracker.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Form parameters for a mutating call, in submission order.
pub type Params = Vec<(String, String)>;

/// What the server did with a mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The server finished the work before answering.
    Completed {
        /// Exit status of the synchronous operation (`OK` on success)
        exit_status: String,
    },
    /// The server queued a task and handed back its identifier.
    Accepted {
        upid: String,
    },
}

/// Minimal request surface the task tracker needs from the API.
///
/// Implementations own session handling, authentication and retries;
/// the tracker only issues these three calls.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue a mutating call (`POST`).
    async fn post_operation(&self, path: &str, params: &Params) -> Result<OperationOutcome>;

    /// Fetch a JSON document (`GET`). Retries, if any, happen here.
    async fn get_json(&self, path: &str) -> Result<serde_json::Value>;

    /// Delete a resource (`DELETE`), giving up after `timeout`.
    async fn delete_resource(&self, path: &str, timeout: Duration) -> Result<()>;
}
