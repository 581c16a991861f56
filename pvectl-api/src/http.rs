//! reqwest-backed [`ApiTransport`] talking to the management REST API.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::traits::{ApiTransport, OperationOutcome, Params};

/// HTTP transport for the management API.
///
/// Every response is an envelope of the form `{"data": ...}`.
pub struct HttpTransport {
    base_url: String,
    authorization: Option<String>,
    http_client: reqwest::Client,
    max_retries: u32,
    retry_initial_delay: Duration,
    retry_max_delay: Duration,
}

impl HttpTransport {
    /// Create a transport from validated configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        if !config.verify_tls {
            warn!(base_url = %config.base_url, "TLS certificate verification disabled");
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization: config.authorization(),
            http_client,
            max_retries: config.max_retries,
            retry_initial_delay: config.retry_initial_delay(),
            retry_max_delay: config.retry_max_delay(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, self.url(path));
        match &self.authorization {
            Some(auth) => builder.header(reqwest::header::AUTHORIZATION, auth),
            None => builder,
        }
    }

    /// Turn a response into its JSON body, mapping non-2xx to [`ApiError::Http`].
    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Http { status: status.as_u16(), body });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn get_once(&self, path: &str) -> Result<serde_json::Value> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    async fn post_operation(&self, path: &str, params: &Params) -> Result<OperationOutcome> {
        let response = self
            .request(reqwest::Method::POST, path)
            .form(params)
            .send()
            .await?;

        let json = Self::read_json(response).await?;
        let outcome = outcome_from_envelope(&json);

        debug!(outcome = ?outcome, "Operation submitted");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let mut retry_delay = self.retry_initial_delay;
        let mut attempt = 0;

        loop {
            match self.get_once(path).await {
                Ok(json) => return Ok(json),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt = attempt,
                        retry_in_ms = retry_delay.as_millis() as u64,
                        "GET failed, will retry"
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = std::cmp::min(retry_delay * 2, self.retry_max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_resource(&self, path: &str, timeout: Duration) -> Result<()> {
        let send = self
            .request(reqwest::Method::DELETE, path)
            .timeout(timeout)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| ApiError::Timeout(timeout))??;

        Self::read_json(response).await?;
        Ok(())
    }
}

/// Classify the envelope returned by a mutating call.
///
/// A string payload starting with `UPID:` names a queued task; any other
/// payload means the work is already done.
pub fn outcome_from_envelope(json: &serde_json::Value) -> OperationOutcome {
    match json.get("data").and_then(|v| v.as_str()) {
        Some(upid) if upid.starts_with(crate::task::UPID_PREFIX) => OperationOutcome::Accepted {
            upid: upid.to_string(),
        },
        _ => OperationOutcome::Completed {
            exit_status: "OK".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_from_envelope() {
        let upid = "UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:";
        assert_eq!(
            outcome_from_envelope(&json!({ "data": upid })),
            OperationOutcome::Accepted { upid: upid.to_string() }
        );
        assert_eq!(
            outcome_from_envelope(&json!({ "data": null })),
            OperationOutcome::Completed { exit_status: "OK".to_string() }
        );
        assert_eq!(
            outcome_from_envelope(&json!({ "data": "some-config-digest" })),
            OperationOutcome::Completed { exit_status: "OK".to_string() }
        );
    }

    #[test]
    fn test_url_joining() {
        let mut config = ClientConfig::default();
        config.base_url = "https://pve1:8006/api2/json/".to_string();
        let transport = HttpTransport::new(&config).expect("transport");

        assert_eq!(
            transport.url("/nodes/pve1/status"),
            "https://pve1:8006/api2/json/nodes/pve1/status"
        );
        assert_eq!(
            transport.url("version"),
            "https://pve1:8006/api2/json/version"
        );
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.base_url = String::new();
        assert!(HttpTransport::new(&config).is_err());
    }
}
