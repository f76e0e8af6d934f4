//! Retry utilities for source-chain submissions
//!
//! Approvals and burns are retried only on account-nonce races, with a small
//! fixed bound and a fixed backoff. Every other error class propagates on the
//! first failure.

use std::future::Future;
use std::time::Duration;

use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bounded retry configuration for nonce-race recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed wait between attempts in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Wait between attempts
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Check if another attempt is allowed after `attempt` (1-indexed) failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Classifies collaborator errors for retry and mapping decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Account nonce raced another submission; safe to resubmit
    NonceRace,
    /// Account cannot cover the amount or fees
    InsufficientFunds,
    /// Ledger or contract rejected the transaction
    Rejected,
    /// Network-level failure (timeout, connection, gateway)
    Transport,
    /// Unknown error
    Unknown,
}

/// Classify an error from its rendered message
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce expired")
        || error_lower.contains("nonce_expired")
        || error_lower.contains("replacement transaction underpriced")
        || error_lower.contains("already known")
        || error_lower.contains("sequence_number_too_old")
    {
        return ErrorClass::NonceRace;
    }

    if error_lower.contains("insufficient funds")
        || error_lower.contains("insufficient balance")
        || error_lower.contains("exceeds balance")
    {
        return ErrorClass::InsufficientFunds;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("vm_status")
        || error_lower.contains("move_abort")
        || error_lower.contains("invalid signature")
        || error_lower.contains("out of gas")
    {
        return ErrorClass::Rejected;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("error sending request")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transport;
    }

    ErrorClass::Unknown
}

/// Run `operation`, resubmitting only when it fails with a nonce race.
///
/// Gives up after `config.max_attempts` total attempts and returns the last
/// error. Non-nonce failures are returned immediately.
pub async fn retry_on_nonce_race<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "Succeeded after nonce retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let rendered = format!("{:#}", e);
                let class = classify_error(&rendered);
                if class != ErrorClass::NonceRace || !config.should_retry(attempt) {
                    return Err(e);
                }
                warn!(
                    label,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %rendered,
                    "Nonce race, retrying after backoff"
                );
                tokio::time::sleep(config.backoff()).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_classify_nonce_race() {
        assert_eq!(classify_error("nonce too low"), ErrorClass::NonceRace);
        assert_eq!(classify_error("NONCE_EXPIRED"), ErrorClass::NonceRace);
        assert_eq!(
            classify_error("replacement transaction underpriced"),
            ErrorClass::NonceRace
        );
    }

    #[test]
    fn test_classify_other_classes() {
        assert_eq!(
            classify_error("insufficient funds for gas * price + value"),
            ErrorClass::InsufficientFunds
        );
        assert_eq!(
            classify_error("execution reverted: ERC20: transfer amount exceeds allowance"),
            ErrorClass::Rejected
        );
        assert_eq!(classify_error("connection refused"), ErrorClass::Transport);
        assert_eq!(classify_error("HTTP 503 Service Unavailable"), ErrorClass::Transport);
        assert_eq!(classify_error("something strange"), ErrorClass::Unknown);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::default();
        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert_eq!(config.backoff(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_nonce_race_up_to_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_nonce_race(&RetryConfig::default(), "burn", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(eyre::eyre!("nonce too low")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_nonce_race() {
        let calls = AtomicU32::new(0);
        let result = retry_on_nonce_race(&RetryConfig::default(), "approve", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(eyre::eyre!("NONCE_EXPIRED"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_nonce_race(&RetryConfig::default(), "burn", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(eyre::eyre!("execution reverted")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
