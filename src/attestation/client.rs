//! Attestation authority HTTP client

use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::AttestationResponse;
use crate::config::AttestationConfig;
use crate::types::MessageHash;

/// Single status query against the attestation authority
#[async_trait]
pub trait AttestationApi: Send + Sync {
    /// Current status of `message_hash`. Unknown messages report pending.
    async fn fetch(&self, message_hash: &MessageHash) -> Result<AttestationResponse>;
}

/// Circle Iris client (`GET /v1/attestations/{messageHash}`)
pub struct IrisClient {
    base_url: String,
    client: Client,
}

impl IrisClient {
    /// Create a new client with a 30 second request timeout
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Client for the configured authority and request timeout
    pub fn from_config(config: &AttestationConfig) -> Self {
        Self::with_timeout(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AttestationApi for IrisClient {
    async fn fetch(&self, message_hash: &MessageHash) -> Result<AttestationResponse> {
        let url = format!("{}/v1/attestations/{}", self.base_url, message_hash);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query attestation authority")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(message_hash = %message_hash, "Attestation not found yet");
            return Ok(AttestationResponse::pending());
        }

        if !status.is_success() {
            return Err(eyre!(
                "Attestation query failed: {} - {}",
                status,
                response.text().await.unwrap_or_default()
            ));
        }

        response
            .json::<AttestationResponse>()
            .await
            .map_err(|e| eyre!("Failed to parse attestation response: {}", e))
    }
}
