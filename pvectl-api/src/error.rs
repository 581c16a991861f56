//! Error types for the API client and the task tracker.

use std::fmt;

use thiserror::Error;

/// Errors raised by the transport layer while talking to the management API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced a response (DNS, TCP, TLS, timeout).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("API error ({status}): {body}")]
    Http {
        status: u16,
        body: String,
    },

    /// The response body was not the JSON shape we expected.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request did not finish within its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The server returned a task identifier we could not parse.
    #[error("Invalid task identifier: {0}")]
    InvalidUpid(#[from] UpidError),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Reasons a task identifier is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpidError {
    #[error("missing 'UPID:' prefix in {0:?}")]
    MissingPrefix(String),

    #[error("missing trailing ':' in {0:?}")]
    MissingTerminator(String),

    #[error("expected ':' at byte {offset} in {upid:?}")]
    MisplacedSeparator { upid: String, offset: usize },

    #[error("field '{field}' is not 8 hex digits in {upid:?}")]
    BadHexField { upid: String, field: &'static str },

    #[error("field '{field}' is empty in {upid:?}")]
    EmptyField { upid: String, field: &'static str },
}

/// Error observed by a task tracker and handed to every reader.
///
/// Cloneable so that the same stored value can be returned from every
/// accessor that surfaces it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The server reported the task finished with a non-OK exit status.
    /// Displays the exit status text verbatim.
    #[error("{0}")]
    Failed(String),

    /// Polling the task status failed.
    #[error("failed to poll task status: {0}")]
    Status(String),

    /// Fetching a log page failed.
    #[error("failed to fetch task log: {0}")]
    Log(String),

    /// Stopping the task on the server failed.
    #[error("failed to cancel task: {0}")]
    Cancel(String),

    /// Several errors, oldest first.
    #[error("{}", JoinedErrors(.0))]
    Combined(Vec<TaskError>),
}

impl TaskError {
    /// Append `other` to this error, flattening nested combinations.
    pub fn combine(self, other: TaskError) -> TaskError {
        let mut errors = match self {
            TaskError::Combined(errors) => errors,
            single => vec![single],
        };
        match other {
            TaskError::Combined(more) => errors.extend(more),
            single => errors.push(single),
        }
        TaskError::Combined(errors)
    }
}

struct JoinedErrors<'a>(&'a [TaskError]);

impl fmt::Display for JoinedErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_exit_status_verbatim() {
        let err = TaskError::Failed("FAILED: disk full".to_string());
        assert_eq!(err.to_string(), "FAILED: disk full");
    }

    #[test]
    fn test_combine_flattens() {
        let first = TaskError::Failed("job errors".to_string());
        let combined = first
            .combine(TaskError::Cancel("timeout".to_string()))
            .combine(TaskError::Log("gone".to_string()));

        match &combined {
            TaskError::Combined(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected combined error, got {:?}", other),
        }
        assert_eq!(
            combined.to_string(),
            "job errors; failed to cancel task: timeout; failed to fetch task log: gone"
        );
    }

    #[test]
    fn test_http_error_transience() {
        let server = ApiError::Http { status: 503, body: String::new() };
        let client = ApiError::Http { status: 403, body: String::new() };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!ApiError::Decode("bad".to_string()).is_transient());
    }
}
