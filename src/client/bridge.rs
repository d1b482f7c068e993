//! HTTP client for a local messaging bridge.
//!
//! The bridge owns the actual messaging session (login, encryption, entity
//! cache). This client only asks it to resolve a contact and report presence.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::client::types::{ContactHandle, RawPresence};
use crate::client::PresenceClient;
use crate::error::ClientError;

/// Wait used when the bridge rate-limits us without saying for how long.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Bridge connection settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL, e.g. `http://127.0.0.1:8710`
    pub base_url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl BridgeConfig {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn resolve_url(&self) -> String {
        format!("{}/v1/contacts/resolve", self.base_url)
    }

    pub fn presence_url(&self, contact_id: &str) -> String {
        format!("{}/v1/contacts/{contact_id}/presence", self.base_url)
    }
}

/// Rate-limit body some bridges send along with a 429.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<u64>,
}

/// Pick the wait for a 429: header first, then body, then the default.
fn retry_after_secs(header: Option<&str>, body: Option<&str>) -> u64 {
    header
        .and_then(|h| h.trim().parse::<u64>().ok())
        .or_else(|| {
            body.and_then(|b| serde_json::from_str::<RateLimitBody>(b).ok())
                .and_then(|b| b.retry_after)
        })
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Presence client backed by the bridge's HTTP API.
pub struct BridgeClient {
    config: BridgeConfig,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Connect(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map a non-success response to the client error taxonomy.
    async fn failure(response: reqwest::Response) -> ClientError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let header = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.ok();
            return ClientError::rate_limited(retry_after_secs(header.as_deref(), body.as_deref()));
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        ClientError::Transient(format!("bridge returned {status}: {message}"))
    }
}

#[async_trait]
impl PresenceClient for BridgeClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        let response = self
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Connect(
                "bridge rejected the token".to_string(),
            )),
            status => Err(ClientError::Connect(format!("bridge health check returned {status}"))),
        }
    }

    async fn resolve_contact(&mut self, identifier: &str) -> Result<ContactHandle, ClientError> {
        let response = self
            .get(self.config.resolve_url())
            .query(&[("q", identifier)])
            .send()
            .await
            .map_err(|e| ClientError::resolution(identifier, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(ClientError::resolution(identifier, reason));
        }

        response
            .json::<ContactHandle>()
            .await
            .map_err(|e| ClientError::resolution(identifier, format!("bad response: {e}")))
    }

    async fn get_presence(&mut self, contact: &ContactHandle) -> Result<RawPresence, ClientError> {
        let response = self
            .get(self.config.presence_url(&contact.id))
            .send()
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        response
            .json::<RawPresence>()
            .await
            .map_err(|e| ClientError::Transient(format!("bad presence payload: {e}")))
    }

    async fn disconnect(&mut self) {
        // The bridge keeps the messaging session alive on its side.
        debug!(base_url = %self.config.base_url, "bridge client released");
    }
}
