//! Stand-in for operations the server finished synchronously.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use super::status::{is_success_exit, TaskStatus};
use super::Task;
use crate::error::TaskError;

/// A task whose outcome was known before it was constructed.
///
/// Every accessor answers immediately from precomputed values and never
/// touches the network. It has no identifier and no node.
#[derive(Debug, Clone)]
pub struct NullTask {
    exit_status: String,
    error: Option<TaskError>,
    log: Vec<String>,
}

impl NullTask {
    /// A successful synchronous operation.
    pub fn succeeded() -> Self {
        Self::from_exit_status("OK")
    }

    /// Classify `exit_status` the same way the status poller does.
    pub fn from_exit_status(exit_status: impl Into<String>) -> Self {
        let exit_status = exit_status.into();
        let error = if is_success_exit(&exit_status) {
            None
        } else {
            Some(TaskError::Failed(exit_status.clone()))
        };

        Self {
            exit_status,
            error,
            log: Vec::new(),
        }
    }

    /// Freeze the outcome of a task that was waited on before returning.
    pub fn finished(exit_status: Option<String>, result: Result<(), TaskError>, log: Vec<String>) -> Self {
        let error = result.err();
        let exit_status = exit_status.unwrap_or_else(|| match &error {
            Some(err) => err.to_string(),
            None => "OK".to_string(),
        });

        Self {
            exit_status,
            error,
            log,
        }
    }
}

#[async_trait]
impl Task for NullTask {
    fn id(&self) -> &str {
        ""
    }

    fn node(&self) -> &str {
        ""
    }

    fn operation_type(&self) -> &str {
        ""
    }

    fn user(&self) -> &str {
        ""
    }

    async fn snapshot(&self) -> TaskStatus {
        TaskStatus {
            status: "stopped".to_string(),
            exit_status: Some(self.exit_status.clone()),
            ..TaskStatus::default()
        }
    }

    async fn status(&self) -> String {
        "stopped".to_string()
    }

    async fn exit_status(&self) -> Option<String> {
        Some(self.exit_status.clone())
    }

    async fn process_id(&self) -> Option<u64> {
        None
    }

    async fn start_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn end_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn ended(&self) -> Result<bool, TaskError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(true),
        }
    }

    async fn log(&self) -> Vec<String> {
        self.log.clone()
    }

    fn log_stream(&self) -> BoxStream<'_, Result<String, TaskError>> {
        let lines = self.log.iter().cloned().map(Ok);
        let error = self.error.clone().map(Err);
        stream::iter(lines.chain(error)).boxed()
    }

    async fn wait_for_completion(&self) -> Result<(), TaskError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn cancel(&self) -> Result<(), TaskError> {
        Ok(())
    }
}
