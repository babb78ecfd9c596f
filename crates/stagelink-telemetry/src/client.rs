//! HTTP client for the telemetry relay.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use stagelink_core::{
    AttributeRef, AttributeValue, RelayError, TelemetrySource, traits::AttributeList,
};

use crate::config::TelemetryConfig;

/// Telemetry source backed by the relay's two read-only JSON endpoints.
#[derive(Clone)]
pub struct HttpRelayClient {
    client: Client,
    base_url: String,
}

impl HttpRelayClient {
    /// Create a client for the configured relay.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &TelemetryConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.relay_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base url requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Relay request");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| RelayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TelemetrySource for HttpRelayClient {
    async fn list_attributes(&self) -> Result<Vec<AttributeRef>, RelayError> {
        let list: AttributeList = self.get("/attributes").await?;
        Ok(list.items)
    }

    async fn fetch_value(&self, web_id: &str) -> Result<AttributeValue, RelayError> {
        self.get(&format!("/value/{}", urlencoding::encode(web_id))).await
    }
}
