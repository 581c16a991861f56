//! Tracker for a task running on the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::BoxStream;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::error_cell::ErrorCell;
use super::log::LogCache;
use super::signal::Signal;
use super::status::TaskStatus;
use super::upid::Upid;
use super::Task;
use crate::config::{TaskConfig, CANCEL_TIMEOUT};
use crate::error::{ApiError, TaskError};
use crate::traits::ApiTransport;

/// State shared between a [`RemoteTask`] and its background loops.
pub(crate) struct TaskInner {
    pub(crate) upid: Upid,
    pub(crate) transport: Arc<dyn ApiTransport>,
    pub(crate) config: TaskConfig,
    /// Written only by the status poller
    pub(crate) status: Mutex<TaskStatus>,
    /// Written only by the log fetcher
    pub(crate) log: LogCache,
    pub(crate) completion: Signal,
    pub(crate) status_ready: Signal,
    pub(crate) log_started: Signal,
    pub(crate) log_closed: Signal,
    pub(crate) errors: ErrorCell,
}

impl TaskInner {
    fn task_path(&self) -> String {
        format!(
            "nodes/{}/tasks/{}",
            urlencoding::encode(self.upid.node()),
            urlencoding::encode(self.upid.as_str())
        )
    }

    pub(crate) fn status_path(&self) -> String {
        format!("{}/status", self.task_path())
    }

    pub(crate) fn log_path(&self, start: usize, limit: usize) -> String {
        format!("{}/log?start={}&limit={}", self.task_path(), start, limit)
    }

    fn close_all(&self) {
        self.completion.close();
        self.status_ready.close();
        self.log_started.close();
        self.log_closed.close();
    }
}

/// Outcome of the one stop request a task ever sends, shared by every canceller.
type StopRequest = Shared<BoxFuture<'static, Result<(), TaskError>>>;

/// A task the server is executing asynchronously.
///
/// Status polling starts on construction; log fetching starts the first
/// time a log accessor is used. Accessors that need server data wait for it.
/// Dropping the tracker stops both background loops.
pub struct RemoteTask {
    inner: Arc<TaskInner>,
    poller: JoinHandle<()>,
    fetcher: OnceLock<JoinHandle<()>>,
    stop: std::sync::Mutex<Option<StopRequest>>,
}

impl RemoteTask {
    /// Start tracking `upid`. Must be called from within a tokio runtime.
    pub fn spawn(transport: Arc<dyn ApiTransport>, upid: Upid, config: TaskConfig) -> Self {
        let inner = Arc::new(TaskInner {
            upid,
            transport,
            config,
            status: Mutex::new(TaskStatus::default()),
            log: LogCache::default(),
            completion: Signal::new(),
            status_ready: Signal::new(),
            log_started: Signal::new(),
            log_closed: Signal::new(),
            errors: ErrorCell::new(),
        });

        info!(upid = %inner.upid, node = %inner.upid.node(), "Tracking task");
        let poller = tokio::spawn(inner.clone().run_status_poller());

        Self {
            inner,
            poller,
            fetcher: OnceLock::new(),
            stop: std::sync::Mutex::new(None),
        }
    }

    pub fn upid(&self) -> &Upid {
        &self.inner.upid
    }

    fn ensure_log_fetcher(&self) {
        self.fetcher
            .get_or_init(|| tokio::spawn(self.inner.clone().run_log_fetcher()));
    }

    fn log_fetcher_started(&self) -> bool {
        self.fetcher.get().is_some()
    }

    /// Send the stop request on a detached task. Waiters are released and a
    /// failure is recorded even if every canceller stops waiting.
    fn start_stop(&self) -> StopRequest {
        info!(upid = %self.inner.upid, "Stopping task");
        let inner = self.inner.clone();

        let request = tokio::spawn(async move {
            let path = inner.task_path();
            let result = tokio::time::timeout(
                CANCEL_TIMEOUT,
                inner.transport.delete_resource(&path, CANCEL_TIMEOUT),
            )
            .await
            .unwrap_or_else(|_| Err(ApiError::Timeout(CANCEL_TIMEOUT)));

            let outcome = result.map_err(|e| {
                warn!(upid = %inner.upid, error = %e, "Failed to stop task");
                inner.errors.combine(TaskError::Cancel(e.to_string()))
            });
            inner.close_all();
            outcome
        });

        let inner = self.inner.clone();
        async move {
            match request.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = inner.errors.combine(TaskError::Cancel(e.to_string()));
                    inner.close_all();
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn read_status<T>(&self, read: impl FnOnce(&TaskStatus) -> T) -> T {
        self.inner.status_ready.wait().await;
        let status = self.inner.status.lock().await;
        read(&status)
    }
}

impl Drop for RemoteTask {
    fn drop(&mut self) {
        self.poller.abort();
        if let Some(fetcher) = self.fetcher.get() {
            fetcher.abort();
        }
    }
}

#[async_trait]
impl Task for RemoteTask {
    fn id(&self) -> &str {
        self.inner.upid.as_str()
    }

    fn node(&self) -> &str {
        self.inner.upid.node()
    }

    fn operation_type(&self) -> &str {
        self.inner.upid.operation_type()
    }

    fn user(&self) -> &str {
        self.inner.upid.user()
    }

    async fn snapshot(&self) -> TaskStatus {
        self.read_status(TaskStatus::clone).await
    }

    async fn status(&self) -> String {
        self.read_status(|s| s.status.clone()).await
    }

    async fn exit_status(&self) -> Option<String> {
        self.read_status(|s| s.exit_status.clone()).await
    }

    async fn process_id(&self) -> Option<u64> {
        self.read_status(|s| s.pid).await
    }

    async fn start_time(&self) -> Option<DateTime<Utc>> {
        self.read_status(TaskStatus::started_at).await
    }

    async fn end_time(&self) -> Option<DateTime<Utc>> {
        self.read_status(TaskStatus::ended_at).await
    }

    async fn ended(&self) -> Result<bool, TaskError> {
        let finished = self.read_status(TaskStatus::is_finished).await;
        match self.inner.errors.get() {
            Some(err) => Err(err),
            None => Ok(finished || self.inner.completion.is_closed()),
        }
    }

    async fn log(&self) -> Vec<String> {
        self.ensure_log_fetcher();
        self.inner.log_started.wait().await;
        self.inner.log.snapshot()
    }

    fn log_stream(&self) -> BoxStream<'_, Result<String, TaskError>> {
        self.ensure_log_fetcher();
        self.inner.clone().log_lines()
    }

    async fn wait_for_completion(&self) -> Result<(), TaskError> {
        self.inner.status_ready.wait().await;
        self.inner.completion.wait().await;
        if self.log_fetcher_started() {
            self.inner.log_closed.wait().await;
        }
        match self.inner.errors.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[instrument(skip(self), fields(upid = %self.inner.upid))]
    async fn cancel(&self) -> Result<(), TaskError> {
        let stop = {
            let mut stop = self.stop.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match stop.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None if self.inner.completion.is_closed() => return Ok(()),
                None => {
                    let started = self.start_stop();
                    *stop = Some(started.clone());
                    started
                }
            }
        };

        stop.await
    }
}
