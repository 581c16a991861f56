//! Client configuration.
//!
//! Loaded from YAML with sensible defaults; every field may be omitted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pvectl/config.yaml";

/// Page size used when reading task logs.
pub const DEFAULT_LOG_PAGE_SIZE: usize = 510;

/// Deadline for the stop request issued by a cancel.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and behaviour settings for [`crate::Client`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://pve1.example.com:8006/api2/json`
    pub base_url: String,
    /// API token id (`user@realm!tokenname`)
    pub token_id: String,
    /// API token secret
    pub token_secret: String,
    /// Verify the server TLS certificate
    pub verify_tls: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Extra attempts for failed GET requests
    pub max_retries: u32,
    /// First retry delay in milliseconds (doubles on every retry)
    pub retry_initial_delay_ms: u64,
    /// Upper bound for the retry delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// Track accepted operations asynchronously. When disabled, submitting
    /// an operation waits for it to finish before returning.
    pub async_tasks: bool,
    /// Task tracker settings
    pub tasks: TaskConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8006/api2/json".to_string(),
            token_id: String::new(),
            token_secret: String::new(),
            verify_tls: true,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 8000,
            async_tasks: true,
            tasks: TaskConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            ApiError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(content)
            .map_err(|e| ApiError::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ApiError::InvalidConfig("base_url must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::InvalidConfig(format!(
                "base_url must start with http:// or https://, got {}",
                self.base_url
            )));
        }
        if self.token_id.is_empty() != self.token_secret.is_empty() {
            return Err(ApiError::InvalidConfig(
                "token_id and token_secret must be set together".to_string(),
            ));
        }
        self.tasks.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Value of the `Authorization` header, if a token is configured.
    pub fn authorization(&self) -> Option<String> {
        if self.token_id.is_empty() {
            return None;
        }
        Some(format!("PVEAPIToken={}={}", self.token_id, self.token_secret))
    }
}

/// Task tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Delay between status polls and between empty log pages
    pub poll_interval_ms: u64,
    /// Lines requested per log page
    pub log_page_size: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            log_page_size: DEFAULT_LOG_PAGE_SIZE,
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ApiError::InvalidConfig("tasks.poll_interval_ms must be > 0".to_string()));
        }
        if self.log_page_size == 0 {
            return Err(ApiError::InvalidConfig("tasks.log_page_size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.async_tasks);
        assert_eq!(config.tasks.log_page_size, 510);
        assert_eq!(config.tasks.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
base_url: https://pve1.lab:8006/api2/json
token_id: automation@pve!ci
token_secret: 0000-1111
verify_tls: false
max_retries: 5
async_tasks: false
tasks:
  poll_interval_ms: 250
"#;
        let config = ClientConfig::from_yaml(yaml).expect("config should parse");

        assert_eq!(config.base_url, "https://pve1.lab:8006/api2/json");
        assert!(!config.verify_tls);
        assert_eq!(config.max_retries, 5);
        assert!(!config.async_tasks);
        assert_eq!(config.tasks.poll_interval_ms, 250);
        // Unset fields keep their defaults
        assert_eq!(config.tasks.log_page_size, 510);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(
            config.authorization().as_deref(),
            Some("PVEAPIToken=automation@pve!ci=0000-1111")
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.base_url = "pve1:8006".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.token_id = "root@pam!x".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.tasks.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.tasks.log_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::load("/nonexistent/pvectl.yaml").unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }
}
