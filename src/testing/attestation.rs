use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result};

use super::{lock, TEST_ATTESTATION};
use crate::attestation::{AttestationApi, AttestationResponse};
use crate::types::MessageHash;

enum Scripted {
    Response(AttestationResponse),
    Error(String),
}

/// Attestation authority that replays scripted responses.
///
/// Queued responses are served first, in order. Once the queue is empty every
/// query gets the default error, else the default response, else `pending`.
#[derive(Default)]
pub struct MockAttestationApi {
    queue: Mutex<VecDeque<Scripted>>,
    default_response: Mutex<Option<AttestationResponse>>,
    default_error: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    fetch_count: AtomicUsize,
}

impl MockAttestationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: AttestationResponse) {
        lock(&self.queue).push_back(Scripted::Response(response));
    }

    pub fn push_error(&self, message: &str) {
        lock(&self.queue).push_back(Scripted::Error(message.to_string()));
    }

    pub fn set_default_response(&self, response: AttestationResponse) {
        *lock(&self.default_response) = Some(response);
    }

    pub fn set_default_error(&self, message: &str) {
        *lock(&self.default_error) = Some(message.to_string());
    }

    /// Every query not otherwise scripted completes with [`TEST_ATTESTATION`]
    pub fn attest_everything(&self) {
        self.set_default_response(AttestationResponse {
            status: "complete".to_string(),
            attestation: Some(format!("0x{}", hex::encode(TEST_ATTESTATION))),
            message: None,
        });
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<AttestationResponse> {
        if let Some(scripted) = lock(&self.queue).pop_front() {
            return match scripted {
                Scripted::Response(response) => Ok(response),
                Scripted::Error(message) => Err(eyre!(message)),
            };
        }
        if let Some(message) = lock(&self.default_error).clone() {
            return Err(eyre!(message));
        }
        Ok(lock(&self.default_response)
            .clone()
            .unwrap_or_else(AttestationResponse::pending))
    }
}

#[async_trait]
impl AttestationApi for MockAttestationApi {
    async fn fetch(&self, _hash: &MessageHash) -> Result<AttestationResponse> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.next()
    }
}
