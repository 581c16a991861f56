//! Task status snapshot and the background status poller.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::remote::TaskInner;
use crate::error::{ApiError, TaskError};

/// Last known status of a task, as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// `running` or `stopped`
    #[serde(default)]
    pub status: String,
    /// Present once the task has finished
    #[serde(default, rename = "exitstatus", skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    /// Unix seconds
    #[serde(default, rename = "starttime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Unix seconds
    #[serde(default, rename = "endtime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// Remaining keys of the status document
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskStatus {
    /// Extract the status from a `{"data": {...}}` envelope.
    pub fn from_envelope(json: serde_json::Value) -> Result<Self, ApiError> {
        let data = match json {
            serde_json::Value::Object(mut map) => map.remove("data"),
            _ => None,
        }
        .ok_or_else(|| ApiError::Decode("status response has no 'data' object".to_string()))?;

        Ok(serde_json::from_value(data)?)
    }

    pub fn is_finished(&self) -> bool {
        self.exit_status.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.and_then(|t| Utc.timestamp_opt(t, 0).single())
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.and_then(|t| Utc.timestamp_opt(t, 0).single())
    }
}

/// Whether an exit status reports success. Warnings still count as success.
pub fn is_success_exit(exit_status: &str) -> bool {
    exit_status.starts_with("OK") || exit_status.starts_with("WARNINGS")
}

impl TaskInner {
    async fn fetch_status(&self) -> Result<TaskStatus, ApiError> {
        let json = self.transport.get_json(&self.status_path()).await?;
        TaskStatus::from_envelope(json)
    }

    /// Poll the task until it finishes, fails to poll, or is cancelled.
    ///
    /// Every exit path closes `completion`.
    pub(crate) async fn run_status_poller(self: Arc<Self>) {
        let interval = self.config.poll_interval();
        debug!(upid = %self.upid, "Status poller started");

        loop {
            if self.completion.is_closed() {
                debug!(upid = %self.upid, "Status poller stopped before fetch");
                return;
            }

            let status = match self.fetch_status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!(upid = %self.upid, error = %e, "Failed to poll task status");
                    self.errors.set(TaskError::Status(e.to_string()));
                    // Release readers waiting for a status that will never come.
                    self.status_ready.close();
                    self.completion.close();
                    return;
                }
            };

            let exit_status = status.exit_status.clone();
            *self.status.lock().await = status;
            if self.status_ready.close() {
                debug!(upid = %self.upid, "First task status received");
            }

            if let Some(exit_status) = exit_status {
                if self.completion.is_closed() {
                    // Cancelled while the request was in flight
                    return;
                }
                if is_success_exit(&exit_status) {
                    info!(upid = %self.upid, exit_status = %exit_status, "Task finished");
                } else {
                    warn!(upid = %self.upid, exit_status = %exit_status, "Task failed");
                    self.errors.set(TaskError::Failed(exit_status));
                }
                self.completion.close();
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.completion.wait() => {
                    debug!(upid = %self.upid, "Status poller woken by completion");
                    return;
                }
            }
        }
    }
}
