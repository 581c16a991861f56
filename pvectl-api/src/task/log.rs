//! Append-only task log cache and the lazily started log fetcher.

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::remote::TaskInner;
use crate::error::{ApiError, TaskError};

/// Prefix of the final line the server writes to every task log.
pub const FINAL_LINE_PREFIX: &str = "TASK";

/// Log lines keyed by their absolute index.
///
/// Single writer (the fetcher), many readers. Entries are never replaced or
/// removed, and the writer fills indices in order, so the populated keys are
/// always `0..len`.
#[derive(Debug, Default)]
pub(crate) struct LogCache {
    lines: DashMap<usize, String>,
    total: AtomicUsize,
}

impl LogCache {
    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<String> {
        self.lines.get(&index).map(|line| line.value().clone())
    }

    /// Store `line` at `index` unless that index is already filled.
    pub(crate) fn insert(&self, index: usize, line: String) -> bool {
        let mut inserted = false;
        self.lines.entry(index).or_insert_with(|| {
            inserted = true;
            line
        });
        inserted
    }

    /// Line count last reported by the server.
    pub(crate) fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Release);
    }

    /// Ordered copy of every line known so far.
    pub(crate) fn snapshot(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.len());
        while let Some(line) = self.get(lines.len()) {
            lines.push(line);
        }
        lines
    }
}

#[derive(Debug, Deserialize)]
struct LogPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    data: Vec<LogLine>,
}

#[derive(Debug, Deserialize)]
struct LogLine {
    #[serde(default)]
    t: String,
}

impl TaskInner {
    async fn fetch_log_page(&self, start: usize) -> Result<LogPage, ApiError> {
        let path = self.log_path(start, self.config.log_page_size);
        let json = self.transport.get_json(&path).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Page through the remote log into the cache.
    ///
    /// Runs until the final `TASK` line is cached and the cache holds the
    /// reported total, or until the task has completed and the remaining
    /// pages have been drained. Always closes `log_started` and `log_closed`
    /// on exit.
    pub(crate) async fn run_log_fetcher(self: Arc<Self>) {
        let interval = self.config.poll_interval();
        debug!(upid = %self.upid, page_size = self.config.log_page_size, "Log fetcher started");

        loop {
            let draining = self.completion.is_closed();
            let start = self.log.len();

            let page = match self.fetch_log_page(start).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(upid = %self.upid, offset = start, error = %e, "Failed to fetch task log");
                    self.errors.set(TaskError::Log(e.to_string()));
                    break;
                }
            };

            let received = page.data.len();
            for (i, line) in page.data.into_iter().enumerate() {
                let is_final = line.t.starts_with(FINAL_LINE_PREFIX);
                self.log.insert(start + i, line.t);
                if is_final && self.log_closed.close() {
                    debug!(upid = %self.upid, lines = start + i + 1, "Final log line received");
                }
            }
            self.log.set_total(page.total);
            self.log_started.close();

            let caught_up = self.log.len() >= page.total;
            if caught_up && self.log_closed.is_closed() {
                break;
            }

            if draining {
                if caught_up || received == 0 {
                    break;
                }
                continue;
            }

            if received == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.completion.wait() => {}
                }
            }
        }

        debug!(upid = %self.upid, lines = self.log.len(), total = self.log.total(), "Log fetcher finished");
        self.log_started.close();
        self.log_closed.close();
    }

    /// Lazily yield log lines in index order.
    ///
    /// Waits (by sleeping) for the next index to appear and ends once it is
    /// absent after both the task and the log are closed. A stored error is
    /// yielded as the final item.
    pub(crate) fn log_lines(self: Arc<Self>) -> BoxStream<'static, Result<String, TaskError>> {
        stream::unfold(Some((self, 0usize)), |state| async move {
            let (inner, next) = state?;
            let interval = inner.config.poll_interval();

            loop {
                if let Some(line) = inner.log.get(next) {
                    return Some((Ok(line), Some((inner, next + 1))));
                }

                if inner.completion.is_closed() && inner.log_closed.is_closed() {
                    // The writer caches a line before closing the log, so
                    // look once more before giving up.
                    if let Some(line) = inner.log.get(next) {
                        return Some((Ok(line), Some((inner, next + 1))));
                    }
                    return inner.errors.get().map(|err| (Err(err), None));
                }

                tokio::time::sleep(interval).await;
            }
        })
        .boxed()
    }
}
