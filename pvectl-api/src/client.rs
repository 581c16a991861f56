//! High-level client: submits operations and hands back task trackers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{ClientConfig, TaskConfig};
use crate::error::{ApiError, Result};
use crate::http::HttpTransport;
use crate::task::{NullTask, RemoteTask, Task, Upid};
use crate::traits::{ApiTransport, OperationOutcome, Params};

/// Entry in a node's task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub upid: String,
    #[serde(default)]
    pub node: String,
    #[serde(default, rename = "type")]
    pub operation_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user: String,
    /// Exit status, absent while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "starttime")]
    pub start_time: i64,
    #[serde(default, rename = "endtime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

/// Server version information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release: String,
}

/// API client.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn ApiTransport>,
    tasks: TaskConfig,
    async_tasks: bool,
}

impl Client {
    /// Create a client talking HTTP to `config.base_url`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Create a client on top of an existing transport.
    ///
    /// Only the task settings are validated; connection settings belong to
    /// the transport.
    pub fn with_transport(transport: Arc<dyn ApiTransport>, config: &ClientConfig) -> Result<Self> {
        config.tasks.validate()?;
        Ok(Self {
            transport,
            tasks: config.tasks.clone(),
            async_tasks: config.async_tasks,
        })
    }

    pub fn transport(&self) -> Arc<dyn ApiTransport> {
        self.transport.clone()
    }

    /// GET `path` and return the `data` member of the envelope.
    pub async fn get(&self, path: &str) -> Result<serde_json::Value> {
        let mut json = self.transport.get_json(path).await?;
        json.get_mut("data")
            .map(serde_json::Value::take)
            .ok_or_else(|| ApiError::Decode(format!("response for {} has no 'data' member", path)))
    }

    pub async fn version(&self) -> Result<VersionInfo> {
        let data = self.get("version").await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Recent tasks on `node`, newest first as returned by the server.
    pub async fn list_tasks(&self, node: &str) -> Result<Vec<TaskSummary>> {
        let data = self
            .get(&format!("nodes/{}/tasks", urlencoding::encode(node)))
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Submit a mutating operation.
    ///
    /// Returns a [`RemoteTask`] when the server queued the work, or a
    /// [`NullTask`] when it finished synchronously. With `async_tasks`
    /// disabled, a queued task is waited on here and returned as a
    /// [`NullTask`] holding its final outcome and log.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub async fn submit(&self, path: &str, params: &Params) -> Result<Arc<dyn Task>> {
        match self.transport.post_operation(path, params).await? {
            OperationOutcome::Completed { exit_status } => {
                debug!(exit_status = %exit_status, "Operation completed synchronously");
                Ok(Arc::new(NullTask::from_exit_status(exit_status)))
            }
            OperationOutcome::Accepted { upid } => {
                let task = self.attach(&upid)?;
                if self.async_tasks {
                    return Ok(Arc::new(task));
                }

                info!(upid = %upid, "Waiting for task to finish");
                // Request the log first so waiting also drains it.
                let _ = task.log().await;
                let result = task.wait_for_completion().await;
                let exit_status = task.exit_status().await;
                let log = task.log().await;
                Ok(Arc::new(NullTask::finished(exit_status, result, log)))
            }
        }
    }

    /// Start tracking an existing task.
    pub fn attach(&self, upid: &str) -> Result<RemoteTask> {
        let upid = Upid::parse(upid)?;
        Ok(RemoteTask::spawn(self.transport.clone(), upid, self.tasks.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTask, MockTransport};
    use serde_json::json;

    const UPID: &str = "UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:";

    fn client(mock: Arc<MockTransport>, async_tasks: bool) -> Client {
        let mut config = ClientConfig::default();
        config.async_tasks = async_tasks;
        config.tasks.poll_interval_ms = 10;
        Client::with_transport(mock, &config).expect("valid config")
    }

    #[test]
    fn test_task_summary_decoding() {
        let summary: TaskSummary = serde_json::from_value(json!({
            "upid": UPID,
            "node": "pve1",
            "type": "qmstart",
            "id": "100",
            "user": "root@pam",
            "starttime": 1700000013,
            "endtime": 1700000020,
            "status": "OK",
            "pid": 41394
        }))
        .expect("summary should decode");

        assert_eq!(summary.operation_type, "qmstart");
        assert_eq!(summary.status.as_deref(), Some("OK"));
        assert_eq!(summary.end_time, Some(1700000020));
    }

    #[tokio::test]
    async fn test_version() {
        let mock = Arc::new(MockTransport::new());
        let version = client(mock, true).version().await.unwrap();
        assert_eq!(version.version, "8.1.4");
    }

    #[test]
    fn test_with_transport_rejects_invalid_task_settings() {
        let mut config = ClientConfig::default();
        config.tasks.poll_interval_ms = 0;
        let err = Client::with_transport(Arc::new(MockTransport::new()), &config)
            .err()
            .expect("zero poll interval should be rejected");
        assert!(matches!(err, ApiError::InvalidConfig(_)));

        let mut config = ClientConfig::default();
        config.tasks.log_page_size = 0;
        assert!(Client::with_transport(Arc::new(MockTransport::new()), &config).is_err());
    }

    #[tokio::test]
    async fn test_attach_rejects_malformed_upid() {
        let mock = Arc::new(MockTransport::new());
        let err = client(mock, true).attach("not-a-upid").err().expect("should fail");
        assert!(matches!(err, ApiError::InvalidUpid(_)));
    }

    #[tokio::test]
    async fn test_synchronous_operation_yields_null_task() {
        let mock = Arc::new(MockTransport::new());
        let task = client(mock, true)
            .submit("nodes/pve1/qemu/100/config", &Vec::new())
            .await
            .unwrap();

        assert_eq!(task.id(), "");
        assert_eq!(task.wait_for_completion().await, Ok(()));
    }

    #[tokio::test]
    async fn test_accepted_operation_yields_remote_task() {
        let mock = Arc::new(MockTransport::new());
        mock.add_task(UPID, MockTask::finished("OK", vec!["starting VM 100".to_string()]));
        mock.queue_outcome(OperationOutcome::Accepted { upid: UPID.to_string() });

        let task = client(mock, true)
            .submit("nodes/pve1/qemu/100/status/start", &Vec::new())
            .await
            .unwrap();

        assert_eq!(task.id(), UPID);
        assert_eq!(task.node(), "pve1");
        assert_eq!(task.operation_type(), "qmstart");
        assert_eq!(task.user(), "root@pam");
        assert_eq!(task.wait_for_completion().await, Ok(()));
    }

    #[tokio::test]
    async fn test_sync_mode_waits_and_keeps_log() {
        let mock = Arc::new(MockTransport::new());
        mock.add_task(
            UPID,
            MockTask::finished("FAILED: disk full", vec!["allocating disk".to_string()])
                .with_running_polls(2),
        );
        mock.queue_outcome(OperationOutcome::Accepted { upid: UPID.to_string() });

        let task = client(mock, false)
            .submit("nodes/pve1/qemu/100/status/start", &Vec::new())
            .await
            .unwrap();

        // Already resolved: a null task with the final outcome
        assert_eq!(task.id(), "");
        assert_eq!(task.exit_status().await.as_deref(), Some("FAILED: disk full"));
        assert_eq!(
            task.wait_for_completion().await,
            Err(crate::error::TaskError::Failed("FAILED: disk full".to_string()))
        );
        assert_eq!(
            task.log().await,
            vec!["allocating disk".to_string(), "TASK ERROR: FAILED: disk full".to_string()]
        );
    }
}
