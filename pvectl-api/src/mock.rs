//! Mock API transport for testing and development.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::task::Upid;
use crate::traits::{ApiTransport, OperationOutcome, Params};

/// Exit status reported for a task stopped through `DELETE`.
pub const STOPPED_EXIT_STATUS: &str = "interrupted by signal";

/// HTTP method of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMethod {
    Get,
    Post,
    Delete,
}

/// A request received by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    pub method: MockMethod,
    pub path: String,
    pub params: Params,
}

/// Scripted behaviour of one server-side task.
#[derive(Debug, Clone, Default)]
pub struct MockTask {
    /// Log lines visible to the client
    pub log: Vec<String>,
    /// Exit status reported once `running_polls` status requests have been served
    pub exit_status: Option<String>,
    /// Status requests answered with `running` before `exit_status` shows
    pub running_polls: u32,
    /// Answer every status request with this server error
    pub status_error: Option<String>,
    /// Answer every log request with this server error
    pub log_error: Option<String>,
    polls: u32,
}

impl MockTask {
    /// A task that is still running and has an empty log.
    pub fn running() -> Self {
        Self::default()
    }

    /// A task that has already finished with `exit_status` and whose log ends
    /// with the matching `TASK` line.
    pub fn finished(exit_status: &str, mut log: Vec<String>) -> Self {
        log.push(final_line(exit_status));
        Self {
            log,
            exit_status: Some(exit_status.to_string()),
            ..Self::default()
        }
    }

    pub fn with_running_polls(mut self, polls: u32) -> Self {
        self.running_polls = polls;
        self
    }

    pub fn with_status_error(mut self, message: impl Into<String>) -> Self {
        self.status_error = Some(message.into());
        self
    }

    pub fn with_log_error(mut self, message: impl Into<String>) -> Self {
        self.log_error = Some(message.into());
        self
    }

    fn status_document(&mut self, upid: &Upid) -> serde_json::Value {
        let finished = self.polls >= self.running_polls && self.exit_status.is_some();
        self.polls += 1;

        let mut data = json!({
            "upid": upid.as_str(),
            "node": upid.node(),
            "type": upid.operation_type(),
            "id": upid.target_id(),
            "user": upid.user(),
            "pid": upid.pid(),
            "pstart": upid.pstart(),
            "starttime": upid.started_at().map(|t| t.timestamp()),
            "status": if finished { "stopped" } else { "running" },
        });
        if finished {
            data["exitstatus"] = json!(self.exit_status);
            data["endtime"] = json!(upid.started_at().map(|t| t.timestamp() + 60));
        }
        json!({ "data": data })
    }

    fn log_page(&self, start: usize, limit: usize) -> serde_json::Value {
        let end = std::cmp::min(start.saturating_add(limit), self.log.len());
        let data: Vec<_> = self
            .log
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, line)| json!({ "n": start + i + 1, "t": line }))
            .collect();
        json!({ "total": self.log.len(), "data": data })
    }
}

/// Final log line the server writes for `exit_status`.
pub fn final_line(exit_status: &str) -> String {
    if exit_status == "OK" {
        "TASK OK".to_string()
    } else {
        format!("TASK ERROR: {}", exit_status)
    }
}

#[derive(Default)]
struct MockState {
    tasks: HashMap<String, MockTask>,
    outcomes: VecDeque<OperationOutcome>,
    requests: Vec<MockRequest>,
    delete_error: Option<String>,
    delete_delay: Option<Duration>,
}

/// In-memory stand-in for the management API.
///
/// Serves task status, task log pages, task stop requests and a version
/// endpoint from scripted [`MockTask`]s, and records every request.
/// Useful for:
/// - Unit and integration testing of the task tracker
/// - Running the CLI without a server (`--dev`)
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        info!("Creating mock API transport");
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge every later request.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a task under its identifier.
    pub fn add_task(&self, upid: &str, task: MockTask) {
        self.state().tasks.insert(upid.to_string(), task);
    }

    /// Queue the answer to the next `post_operation` call.
    /// Without a queued answer, posts complete synchronously with `OK`.
    pub fn queue_outcome(&self, outcome: OperationOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    /// Append lines to a task's log.
    pub fn append_log<I, S>(&self, upid: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(task) = self.state().tasks.get_mut(upid) {
            task.log.extend(lines.into_iter().map(Into::into));
        }
    }

    /// Finish a running task: write its final log line and report `exit_status`.
    pub fn finish(&self, upid: &str, exit_status: &str) {
        if let Some(task) = self.state().tasks.get_mut(upid) {
            task.log.push(final_line(exit_status));
            task.exit_status = Some(exit_status.to_string());
        }
    }

    /// Make every stop request fail with this server error.
    pub fn set_delete_error(&self, message: impl Into<String>) {
        self.state().delete_error = Some(message.into());
    }

    /// Delay every stop request.
    pub fn set_delete_delay(&self, delay: Duration) {
        self.state().delete_delay = Some(delay);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.state().requests.clone()
    }

    /// Number of requests for `upid` whose path ends with `suffix`
    /// (ignoring the query string).
    pub fn count_requests(&self, method: MockMethod, upid: &str, suffix: &str) -> usize {
        let encoded = urlencoding::encode(upid).into_owned();
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .filter(|r| {
                let path = r.path.split('?').next().unwrap_or_default();
                path.contains(&encoded) && path.ends_with(suffix)
            })
            .count()
    }

    fn record(&self, method: MockMethod, path: &str, params: &Params) {
        self.state().requests.push(MockRequest {
            method,
            path: path.to_string(),
            params: params.clone(),
        });
    }

    fn not_found(path: &str) -> ApiError {
        ApiError::Http {
            status: 404,
            body: format!("no such resource: {}", path),
        }
    }

    fn server_error(message: &str) -> ApiError {
        ApiError::Http {
            status: 500,
            body: message.to_string(),
        }
    }
}

/// A task path split into its parts.
struct TaskRoute {
    upid: String,
    action: Option<String>,
    query: HashMap<String, String>,
}

fn parse_task_route(path: &str) -> Option<TaskRoute> {
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let (upid, action) = match segments.as_slice() {
        ["nodes", _, "tasks", upid] => (*upid, None),
        ["nodes", _, "tasks", upid, action] => (*upid, Some(action.to_string())),
        _ => return None,
    };

    let query = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Some(TaskRoute {
        upid: urlencoding::decode(upid).ok()?.into_owned(),
        action,
        query,
    })
}

fn query_usize(query: &HashMap<String, String>, key: &str, default: usize) -> usize {
    query.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn post_operation(&self, path: &str, params: &Params) -> Result<OperationOutcome> {
        self.record(MockMethod::Post, path, params);
        let outcome = self.state().outcomes.pop_front().unwrap_or(OperationOutcome::Completed {
            exit_status: "OK".to_string(),
        });
        debug!(path = %path, outcome = ?outcome, "Mock operation submitted");
        Ok(outcome)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        self.record(MockMethod::Get, path, &Vec::new());

        if path.trim_start_matches('/') == "version" {
            return Ok(json!({ "data": { "version": "8.1.4", "release": "8.1", "repoid": "mock" } }));
        }

        let route = parse_task_route(path).ok_or_else(|| Self::not_found(path))?;
        let upid = Upid::parse(&route.upid)?;

        let mut state = self.state();
        let task = state
            .tasks
            .get_mut(&route.upid)
            .ok_or_else(|| Self::not_found(path))?;

        match route.action.as_deref() {
            Some("status") => match &task.status_error {
                Some(message) => Err(Self::server_error(message)),
                None => Ok(task.status_document(&upid)),
            },
            Some("log") => match &task.log_error {
                Some(message) => Err(Self::server_error(message)),
                None => {
                    let start = query_usize(&route.query, "start", 0);
                    let limit = query_usize(&route.query, "limit", 50);
                    Ok(task.log_page(start, limit))
                }
            },
            _ => Err(Self::not_found(path)),
        }
    }

    async fn delete_resource(&self, path: &str, timeout: Duration) -> Result<()> {
        self.record(MockMethod::Delete, path, &Vec::new());

        let delay = self.state().delete_delay;
        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(ApiError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let route = parse_task_route(path).ok_or_else(|| Self::not_found(path))?;
        let mut state = self.state();

        if let Some(message) = &state.delete_error {
            return Err(Self::server_error(message));
        }

        let task = state
            .tasks
            .get_mut(&route.upid)
            .ok_or_else(|| Self::not_found(path))?;
        if task.exit_status.is_none() {
            task.log.push(final_line(STOPPED_EXIT_STATUS));
            task.exit_status = Some(STOPPED_EXIT_STATUS.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPID: &str = "UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:";

    fn status_path() -> String {
        format!("nodes/pve1/tasks/{}/status", urlencoding::encode(UPID))
    }

    #[tokio::test]
    async fn test_status_turns_stopped_after_running_polls() {
        let mock = MockTransport::new();
        mock.add_task(UPID, MockTask::finished("OK", vec![]).with_running_polls(2));

        for expected in ["running", "running", "stopped"] {
            let json = mock.get_json(&status_path()).await.unwrap();
            assert_eq!(json["data"]["status"], expected);
        }
        let json = mock.get_json(&status_path()).await.unwrap();
        assert_eq!(json["data"]["exitstatus"], "OK");
        assert_eq!(mock.count_requests(MockMethod::Get, UPID, "/status"), 4);
    }

    #[tokio::test]
    async fn test_log_paging() {
        let mock = MockTransport::new();
        let lines: Vec<String> = (0..7).map(|i| format!("line {}", i)).collect();
        mock.add_task(UPID, MockTask::finished("OK", lines));

        let path = format!("nodes/pve1/tasks/{}/log?start=5&limit=5", urlencoding::encode(UPID));
        let page = mock.get_json(&path).await.unwrap();

        assert_eq!(page["total"], 8);
        let data = page["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0]["t"], "line 5");
        assert_eq!(data[0]["n"], 6);
        assert_eq!(data[2]["t"], "TASK OK");
    }

    #[tokio::test]
    async fn test_delete_stops_running_task() {
        let mock = MockTransport::new();
        mock.add_task(UPID, MockTask::running());

        let path = format!("nodes/pve1/tasks/{}", urlencoding::encode(UPID));
        mock.delete_resource(&path, Duration::from_secs(5)).await.unwrap();

        let json = mock.get_json(&status_path()).await.unwrap();
        assert_eq!(json["data"]["exitstatus"], STOPPED_EXIT_STATUS);
        assert_eq!(mock.count_requests(MockMethod::Delete, UPID, ""), 1);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let mock = MockTransport::new();
        let err = mock.get_json(&status_path()).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_post_defaults_to_synchronous_ok() {
        let mock = MockTransport::new();
        let outcome = mock
            .post_operation("nodes/pve1/qemu/100/config", &vec![("memory".to_string(), "2048".to_string())])
            .await
            .unwrap();
        assert_eq!(outcome, OperationOutcome::Completed { exit_status: "OK".to_string() });

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, MockMethod::Post);
        assert_eq!(requests[0].params[0].0, "memory");
    }
}
