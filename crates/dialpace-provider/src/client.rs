//! Telephony provider client
//!
//! A thin POST wrapper. Placement is never retried here: a timeout after the
//! provider accepted the request would otherwise dial the same person twice.

use async_trait::async_trait;
use dialpace_core::config::ProviderConfig;
use dialpace_core::{CallPlacer, DialpaceError, PlaceCallRequest, Result};
use serde::Serialize;
use std::time::Duration;

/// JSON body sent to the provider
#[derive(Debug, Serialize)]
struct StartCallBody<'a> {
    call_id: &'a str,
    to: &'a str,
    event_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caller_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

impl<'a> From<&'a PlaceCallRequest> for StartCallBody<'a> {
    fn from(request: &'a PlaceCallRequest) -> Self {
        Self {
            call_id: &request.call_id,
            to: &request.destination,
            event_url: &request.event_url,
            caller_id: request.caller_id.as_deref(),
            tag: request.tag.as_deref(),
        }
    }
}

/// Places calls over HTTP
#[derive(Debug, Clone)]
pub struct HttpCallPlacer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpCallPlacer {
    /// Create a placer for `api_url` with the given request timeout
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DialpaceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: None,
        })
    }

    /// Build from the `[provider]` config section
    pub fn from_config(config: &ProviderConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))?
            .with_api_key(api_key))
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl CallPlacer for HttpCallPlacer {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<()> {
        tracing::debug!(
            "Placing call {} to {} via {}",
            request.call_id,
            request.destination,
            self.api_url
        );

        let mut builder = self
            .client
            .post(&self.api_url)
            .json(&StartCallBody::from(request));

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DialpaceError::Placement(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(DialpaceError::Placement(format!(
                "Provider returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!("Provider accepted call {} to {}", request.call_id, request.destination);
        Ok(())
    }
}
