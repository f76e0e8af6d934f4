//! Attestation poller
//!
//! `REQUESTED -> PENDING -> {COMPLETE | FAILED | TIMED_OUT}`
//!
//! Polls the authority on a fixed interval until the message reaches a terminal
//! status. Two independent bounds end the loop: wall-clock time (`max_wait`,
//! further clipped by the caller's deadline) and the attempt count
//! (`max_polls`). Pending responses and transport errors share the attempt
//! counter. Message bytes returned by the authority are only trusted when they
//! hash to the message being polled for.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{AttestationApi, AttestationRecord, AttestationResponse, AttestationStatus};
use crate::cache::BoundedCache;
use crate::config::AttestationConfig;
use crate::error::TransferError;
use crate::events::extract_message;
use crate::hash::message_hash;
use crate::ledger::SourceLedger;
use crate::stage::AttestationStage;
use crate::types::MessageHash;

/// What to poll for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    /// Burn transaction, used to re-extract message bytes from its logs
    pub source_tx_id: String,
    /// Message bytes already known from the burn receipt
    pub message: Option<Vec<u8>>,
    /// Message identifier, derived from `message` when absent
    pub message_hash: Option<MessageHash>,
}

impl PollTarget {
    /// Target for a burn whose message was not captured
    pub fn from_tx(source_tx_id: impl Into<String>) -> Self {
        Self {
            source_tx_id: source_tx_id.into(),
            message: None,
            message_hash: None,
        }
    }
}

/// Polls the attestation authority and memoises terminal records
pub struct AttestationPoller {
    api: Arc<dyn AttestationApi>,
    source: Arc<dyn SourceLedger>,
    config: AttestationConfig,
    cache: Mutex<BoundedCache<AttestationRecord>>,
}

impl AttestationPoller {
    pub fn new(
        api: Arc<dyn AttestationApi>,
        source: Arc<dyn SourceLedger>,
        config: AttestationConfig,
    ) -> Self {
        let cache = BoundedCache::new(config.cache_capacity, config.cache_ttl_secs);
        Self {
            api,
            source,
            config,
            cache: Mutex::new(cache),
        }
    }

    pub fn config(&self) -> &AttestationConfig {
        &self.config
    }

    /// Terminal record for `hash`, if one has been observed
    pub fn cached(&self, hash: &MessageHash) -> Option<AttestationRecord> {
        self.lock_cache().get(hash.as_bytes())
    }

    /// One status query without waiting.
    ///
    /// A terminal record already seen is returned without contacting the
    /// authority. A 404 from the authority reads as pending.
    pub async fn check_status(&self, hash: &MessageHash) -> Result<AttestationRecord, TransferError> {
        if let Some(record) = self.cached(hash) {
            return Ok(record);
        }

        let response = self
            .api
            .fetch(hash)
            .await
            .map_err(|e| TransferError::TransportError(format!("{:#}", e)))?;

        let mut record = AttestationRecord::pending(*hash);
        match response.status() {
            AttestationStatus::Complete => {
                let message = response.message_bytes();
                let consistent = message.as_deref().map_or(true, |m| hash_matches(hash, m));
                if let (Some(attestation), true) = (response.attestation_bytes(), consistent) {
                    record.status = AttestationStatus::Complete;
                    record.attestation = attestation;
                    record.message = message.unwrap_or_default();
                }
            }
            AttestationStatus::Failed => {
                record.status = AttestationStatus::Failed;
                record.message = response
                    .message_bytes()
                    .filter(|m| hash_matches(hash, m))
                    .unwrap_or_default();
            }
            AttestationStatus::Pending => {}
        }

        if record.is_valid() || record.status == AttestationStatus::Failed {
            self.remember(&record);
        }
        Ok(record)
    }

    /// Poll until the message is complete, failed, or a bound is hit.
    ///
    /// Returns `Ok` for both terminal statuses; the caller decides what a
    /// failed record means. `deadline` can only shorten the wait.
    pub async fn poll(
        &self,
        target: &PollTarget,
        deadline: Option<Instant>,
    ) -> Result<AttestationRecord, TransferError> {
        let (hash, known_message) = self.resolve_identity(target).await?;

        if let Some(record) = self.cached(&hash) {
            debug!(message_hash = %hash, status = %record.status, "Attestation served from cache");
            return Ok(record);
        }

        let start = Instant::now();
        let mut limit = start + self.config.max_wait();
        if let Some(deadline) = deadline {
            limit = limit.min(deadline);
        }
        let interval = self.config.poll_interval();
        let mut attempts: u32 = 0;

        info!(
            message_hash = %hash,
            max_polls = self.config.max_polls,
            max_wait_ms = self.config.max_wait_ms,
            "Polling for attestation"
        );

        loop {
            if attempts >= self.config.max_polls || Instant::now() >= limit {
                return Err(timed_out(&hash, attempts, start));
            }
            attempts += 1;

            match timeout_at(limit, self.api.fetch(&hash)).await {
                Err(_) => {
                    debug!(message_hash = %hash, attempt = attempts, "Poll preempted by deadline");
                }
                Ok(Err(e)) => {
                    let err = TransferError::from_collaborator(&e);
                    if err.is_retryable() {
                        warn!(
                            message_hash = %hash,
                            attempt = attempts,
                            error = %err,
                            "Attestation query failed, will retry"
                        );
                    } else {
                        warn!(
                            message_hash = %hash,
                            attempt = attempts,
                            code = err.code(),
                            error = %err,
                            "Unexpected attestation response, counting as pending"
                        );
                    }
                }
                Ok(Ok(response)) => {
                    if let Some(record) = self
                        .terminal_record(target, &hash, known_message.as_deref(), response)
                        .await?
                    {
                        info!(
                            message_hash = %hash,
                            status = %record.status,
                            attempt = attempts,
                            "Attestation reached terminal status"
                        );
                        self.remember(&record);
                        return Ok(record);
                    }
                    debug!(message_hash = %hash, attempt = attempts, "Attestation pending");
                }
            }

            if attempts >= self.config.max_polls {
                return Err(timed_out(&hash, attempts, start));
            }
            let now = Instant::now();
            if now >= limit {
                return Err(timed_out(&hash, attempts, start));
            }
            sleep_until((now + interval).min(limit)).await;
        }
    }

    /// Message hash to poll, plus message bytes when already known
    async fn resolve_identity(
        &self,
        target: &PollTarget,
    ) -> Result<(MessageHash, Option<Vec<u8>>), TransferError> {
        let known = target.message.clone().filter(|m| !m.is_empty());
        match (target.message_hash, known) {
            (Some(hash), known) => Ok((hash, known)),
            (None, Some(message)) => Ok((message_hash(&message), Some(message))),
            (None, None) => {
                let message = self.message_from_source(&target.source_tx_id).await?;
                Ok((message_hash(&message), Some(message)))
            }
        }
    }

    /// Turn a response into a terminal record, or `None` while still pending
    async fn terminal_record(
        &self,
        target: &PollTarget,
        hash: &MessageHash,
        known_message: Option<&[u8]>,
        response: AttestationResponse,
    ) -> Result<Option<AttestationRecord>, TransferError> {
        match response.status() {
            AttestationStatus::Pending => Ok(None),
            AttestationStatus::Complete => {
                let Some(attestation) = response.attestation_bytes() else {
                    debug!(message_hash = %hash, "Complete status without attestation bytes");
                    return Ok(None);
                };
                let message = match response.message_bytes() {
                    Some(message) if !hash_matches(hash, &message) => return Ok(None),
                    Some(message) => message,
                    None => match known_message {
                        Some(message) => message.to_vec(),
                        None => self.message_from_source(&target.source_tx_id).await?,
                    },
                };
                Ok(Some(AttestationRecord {
                    status: AttestationStatus::Complete,
                    message_hash: *hash,
                    message,
                    attestation,
                }))
            }
            AttestationStatus::Failed => Ok(Some(AttestationRecord {
                status: AttestationStatus::Failed,
                message_hash: *hash,
                message: response
                    .message_bytes()
                    .filter(|m| hash_matches(hash, m))
                    .or_else(|| known_message.map(<[u8]>::to_vec))
                    .unwrap_or_default(),
                attestation: Vec::new(),
            })),
        }
    }

    /// Re-extract message bytes from the burn transaction's logs
    async fn message_from_source(&self, tx_id: &str) -> Result<Vec<u8>, TransferError> {
        let logs = self
            .source
            .transaction_logs(tx_id)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?
            .ok_or_else(|| TransferError::MessageNotFound {
                tx_id: tx_id.to_string(),
            })?;

        extract_message(&logs)
            .map(|extracted| extracted.message)
            .ok_or_else(|| TransferError::MessageNotFound {
                tx_id: tx_id.to_string(),
            })
    }

    fn remember(&self, record: &AttestationRecord) {
        self.lock_cache()
            .insert(*record.message_hash.as_bytes(), record.clone());
    }

    fn lock_cache(&self) -> MutexGuard<'_, BoundedCache<AttestationRecord>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whether `message` is the message identified by `hash`
fn hash_matches(hash: &MessageHash, message: &[u8]) -> bool {
    let actual = message_hash(message);
    if actual != *hash {
        warn!(
            message_hash = %hash,
            returned_hash = %actual,
            "Authority returned message bytes for a different message, ignoring them"
        );
        return false;
    }
    true
}

fn timed_out(hash: &MessageHash, attempts: u32, start: Instant) -> TransferError {
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    warn!(message_hash = %hash, attempts, elapsed_ms, "Attestation poll timed out");
    TransferError::AttestationTimeout {
        attempts,
        elapsed_ms,
    }
}

#[async_trait]
impl AttestationStage for AttestationPoller {
    async fn await_attestation(
        &self,
        target: &PollTarget,
        deadline: Option<Instant>,
    ) -> Result<AttestationRecord, TransferError> {
        self.poll(target, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::message_sent_log;
    use crate::testing::{MockAttestationApi, MockSourceLedger};
    use alloy::primitives::Address;
    use std::time::Duration;

    fn fast_config() -> AttestationConfig {
        AttestationConfig {
            poll_interval_ms: 2000,
            max_wait_ms: 300_000,
            max_polls: 150,
            ..AttestationConfig::default()
        }
    }

    fn complete(attestation: &str) -> AttestationResponse {
        AttestationResponse {
            status: "complete".to_string(),
            attestation: Some(attestation.to_string()),
            message: None,
        }
    }

    fn target(message: &[u8]) -> PollTarget {
        PollTarget {
            source_tx_id: "0xburn".to_string(),
            message: Some(message.to_vec()),
            message_hash: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_complete() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(AttestationResponse::pending());
        api.push_response(AttestationResponse::pending());
        api.push_response(complete("0xaabb"));
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let record = poller.poll(&target(b"msg"), None).await.unwrap();
        assert_eq!(record.status, AttestationStatus::Complete);
        assert_eq!(record.attestation, vec![0xaa, 0xbb]);
        assert_eq!(record.message, b"msg".to_vec());
        assert_eq!(record.message_hash, message_hash(b"msg"));
        assert_eq!(api.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_message_bytes_are_not_trusted() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(AttestationResponse {
            status: "complete".to_string(),
            attestation: Some("0xdead".to_string()),
            message: Some(format!("0x{}", hex::encode(b"other message"))),
        });
        api.push_response(AttestationResponse {
            status: "complete".to_string(),
            attestation: Some("0xbeef".to_string()),
            message: Some(format!("0x{}", hex::encode(b"msg"))),
        });
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let record = poller.poll(&target(b"msg"), None).await.unwrap();
        assert_eq!(record.attestation, vec![0xbe, 0xef]);
        assert_eq!(record.message, b"msg".to_vec());
        assert_eq!(message_hash(&record.message), record.message_hash);
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_ignores_foreign_message_bytes() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(AttestationResponse {
            status: "complete".to_string(),
            attestation: Some("0xdead".to_string()),
            message: Some(format!("0x{}", hex::encode(b"other message"))),
        });
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let hash = message_hash(b"msg");
        let record = poller.check_status(&hash).await.unwrap();
        assert_eq!(record.status, AttestationStatus::Pending);
        assert!(record.attestation.is_empty());
        assert!(poller.cached(&hash).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_errors_share_attempt_budget() {
        let api = Arc::new(MockAttestationApi::new());
        api.set_default_error("Failed to parse attestation response: expected value");
        let config = AttestationConfig {
            max_polls: 4,
            ..fast_config()
        };
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), config);

        let err = poller.poll(&target(b"msg"), None).await.unwrap_err();
        assert!(matches!(err, TransferError::AttestationTimeout { attempts: 4, .. }));
        assert_eq!(api.fetch_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_share_attempt_budget() {
        let api = Arc::new(MockAttestationApi::new());
        api.set_default_error("connection reset by peer");
        let config = AttestationConfig {
            max_polls: 5,
            ..fast_config()
        };
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), config);

        let err = poller.poll(&target(b"msg"), None).await.unwrap_err();
        assert!(matches!(err, TransferError::AttestationTimeout { attempts: 5, .. }));
        assert_eq!(api.fetch_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_bound_independent_of_count() {
        let api = Arc::new(MockAttestationApi::new());
        let config = AttestationConfig {
            poll_interval_ms: 2000,
            max_wait_ms: 10_000,
            max_polls: 1000,
            ..AttestationConfig::default()
        };
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), config);

        let start = Instant::now();
        let err = poller.poll(&target(b"msg"), None).await.unwrap_err();
        assert_eq!(err.code(), "ATTESTATION_TIMEOUT");
        assert!(start.elapsed() <= Duration::from_millis(12_000));
        assert!(api.fetch_count() <= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shortens_wait() {
        let api = Arc::new(MockAttestationApi::new());
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let start = Instant::now();
        let deadline = start + Duration::from_secs(5);
        let err = poller.poll(&target(b"msg"), Some(deadline)).await.unwrap_err();
        assert_eq!(err.code(), "ATTESTATION_TIMEOUT");
        assert!(start.elapsed() <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_terminal() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(AttestationResponse {
            status: "failed".to_string(),
            attestation: None,
            message: None,
        });
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let record = poller.poll(&target(b"msg"), None).await.unwrap();
        assert_eq!(record.status, AttestationStatus::Failed);
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_record_is_memoised() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(complete("0x01"));
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let first = poller.poll(&target(b"msg"), None).await.unwrap();
        let second = poller.poll(&target(b"msg"), None).await.unwrap();
        let status = poller.check_status(&first.message_hash).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, status);
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_re_extracted_from_source_logs() {
        let api = Arc::new(MockAttestationApi::new());
        api.push_response(complete("0x01"));
        let source = Arc::new(MockSourceLedger::new());
        source.set_transaction_logs("0xburn", vec![message_sent_log(Address::ZERO, b"from-logs")]);
        let poller = AttestationPoller::new(api, source.clone(), fast_config());

        let record = poller.poll(&PollTarget::from_tx("0xburn"), None).await.unwrap();
        assert_eq!(record.message, b"from-logs".to_vec());
        assert_eq!(record.message_hash, message_hash(b"from-logs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_not_found_is_fatal() {
        let api = Arc::new(MockAttestationApi::new());
        let source = Arc::new(MockSourceLedger::new());
        source.set_transaction_logs("0xburn", vec![]);
        let poller = AttestationPoller::new(api.clone(), source, fast_config());

        let err = poller.poll(&PollTarget::from_tx("0xburn"), None).await.unwrap_err();
        assert!(matches!(err, TransferError::MessageNotFound { .. }));
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_does_not_wait() {
        let api = Arc::new(MockAttestationApi::new());
        let poller = AttestationPoller::new(api.clone(), Arc::new(MockSourceLedger::new()), fast_config());

        let record = poller.check_status(&MessageHash([3u8; 32])).await.unwrap();
        assert_eq!(record.status, AttestationStatus::Pending);
        assert_eq!(api.fetch_count(), 1);
        assert!(poller.cached(&MessageHash([3u8; 32])).is_none());
    }
}
