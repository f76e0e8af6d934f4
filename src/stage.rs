//! Stage interfaces driven by the orchestrator
//!
//! The production implementations are [`BurnClient`](crate::burn::BurnClient),
//! [`AttestationPoller`](crate::attestation::AttestationPoller), and
//! [`MintClient`](crate::mint::MintClient). Tests substitute their own.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::attestation::{AttestationRecord, PollTarget};
use crate::burn::TransferReceipt;
use crate::error::TransferError;
use crate::mint::MintOutcome;
use crate::redact::SecretKey;

/// Burn on the source chain
#[async_trait]
pub trait BurnStage: Send + Sync {
    /// Burn `amount` (decimal string) for `recipient` on the destination chain
    async fn burn(
        &self,
        amount: &str,
        recipient: &str,
        credential: &SecretKey,
    ) -> Result<TransferReceipt, TransferError>;

    /// Rebuild the receipt of an already-final burn from its logs
    async fn recover(&self, source_tx_id: &str) -> Result<TransferReceipt, TransferError>;
}

/// Wait for the authority's attestation
#[async_trait]
pub trait AttestationStage: Send + Sync {
    /// Returns a complete or failed record, or a timeout error
    async fn await_attestation(
        &self,
        target: &PollTarget,
        deadline: Option<Instant>,
    ) -> Result<AttestationRecord, TransferError>;
}

/// Mint on the destination chain
#[async_trait]
pub trait MintStage: Send + Sync {
    async fn mint(
        &self,
        message: &[u8],
        attestation: &[u8],
        credential: &SecretKey,
    ) -> Result<MintOutcome, TransferError>;
}
