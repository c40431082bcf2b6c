use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use callcoach_core::config::AdvisoryConfig;
use callcoach_core::errors::ApplicationError;

use crate::advisory::AdvisoryRequest;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("advisory service is disabled")]
    Disabled,
    #[error("advisory transport failed: {0}")]
    Transport(String),
    #[error("advisory request timed out")]
    Timeout,
    #[error("advisory service answered with status {0}")]
    Status(u16),
    #[error("advisory response could not be read: {0}")]
    Decode(String),
}

impl From<AdvisoryError> for ApplicationError {
    fn from(error: AdvisoryError) -> Self {
        ApplicationError::Advisory(error.to_string())
    }
}

/// Source of advisory suggestions. Returns the raw payload; interpretation is lenient
/// and happens in [`crate::advisory::AdvisoryResponse::parse`].
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledAdvisoryClient;

#[async_trait]
impl AdvisoryClient for DisabledAdvisoryClient {
    async fn advise(&self, _request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
        Err(AdvisoryError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// JSON-over-HTTP advisory client. One POST per call; no retries.
pub struct HttpAdvisoryClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvisoryEnvelope<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a AdvisoryRequest,
}

impl HttpAdvisoryClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdvisoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AdvisoryError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key, model: model.into() })
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
        let envelope = AdvisoryEnvelope { model: &self.model, request };
        let mut builder = self.client.post(&self.endpoint).json(&envelope);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                AdvisoryError::Timeout
            } else {
                AdvisoryError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisoryError::Status(status.as_u16()));
        }

        response.text().await.map_err(|error| {
            if error.is_timeout() {
                AdvisoryError::Timeout
            } else {
                AdvisoryError::Decode(error.to_string())
            }
        })
    }
}

/// Builds the configured client; a disabled section yields [`DisabledAdvisoryClient`].
pub fn client_from_config(
    config: &AdvisoryConfig,
) -> Result<Arc<dyn AdvisoryClient>, AdvisoryError> {
    if !config.enabled {
        return Ok(Arc::new(DisabledAdvisoryClient));
    }
    let Some(endpoint) = config.endpoint.as_deref() else {
        return Err(AdvisoryError::Transport("advisory endpoint is not configured".to_string()));
    };

    let client = HttpAdvisoryClient::new(
        endpoint.trim(),
        config.api_key.clone(),
        config.model.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use callcoach_core::config::AppConfig;
    use callcoach_core::errors::ApplicationError;

    use super::{client_from_config, AdvisoryError};

    #[test]
    fn disabled_section_yields_disabled_client() {
        let config = AppConfig::default();
        let client = client_from_config(&config.advisory).expect("disabled client builds");
        assert!(!client.is_enabled());
    }

    #[test]
    fn enabled_section_builds_http_client() {
        let mut config = AppConfig::default();
        config.advisory.enabled = true;
        config.advisory.endpoint = Some(" http://127.0.0.1:9400/coach ".to_string());

        let client = client_from_config(&config.advisory).expect("http client builds");
        assert!(client.is_enabled());
    }

    #[test]
    fn enabled_without_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.advisory.enabled = true;
        assert!(matches!(client_from_config(&config.advisory), Err(AdvisoryError::Transport(_))));
    }

    #[test]
    fn advisory_errors_map_to_application_errors() {
        let error: ApplicationError = AdvisoryError::Status(503).into();
        assert_eq!(
            error,
            ApplicationError::Advisory("advisory service answered with status 503".to_string())
        );
    }
}
