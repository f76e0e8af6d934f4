//! Source-chain burn client
//!
//! `burn(amount, recipient, credential) -> TransferReceipt`
//!
//! Validation happens before any ledger call. The approval and the burn are each
//! retried only on account-nonce races (fixed bound, fixed backoff); every other
//! failure propagates on first sight. A burn is never resubmitted after a
//! transport error, since the first submission may have landed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::amount::{format_minor_units, to_minor_units};
use crate::config::SourceChainConfig;
use crate::error::TransferError;
use crate::events::{extract_message, extract_nonce, BurnNonce};
use crate::hash::message_hash;
use crate::ledger::{BurnParams, SourceLedger};
use crate::message::MessageHeader;
use crate::redact::SecretKey;
use crate::retry::{classify_error, retry_on_nonce_race, ErrorClass, RetryConfig};
use crate::stage::BurnStage;
use crate::types::{hex_bytes_opt, DestinationAddress, DomainId, MessageHash};

/// Result of a finalized burn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub source_tx_id: String,
    pub nonce: BurnNonce,
    /// Raw CCTP message, when a known event carried it
    #[serde(with = "hex_bytes_opt")]
    pub message: Option<Vec<u8>>,
    pub message_hash: Option<MessageHash>,
    /// Burned amount in source minor units, when known
    pub amount: Option<u128>,
    pub approval_tx_id: Option<String>,
    pub block_number: Option<u64>,
}

/// Burns USDC through the source chain's token messenger
pub struct BurnClient {
    ledger: Arc<dyn SourceLedger>,
    decimals: u8,
    source_domain: DomainId,
    destination_domain: DomainId,
    retry: RetryConfig,
}

impl BurnClient {
    pub fn new(
        ledger: Arc<dyn SourceLedger>,
        source: &SourceChainConfig,
        destination_domain: DomainId,
        retry: RetryConfig,
    ) -> Self {
        Self {
            ledger,
            decimals: source.decimals,
            source_domain: source.domain,
            destination_domain,
            retry,
        }
    }

    /// Approve and burn `amount` for `recipient`
    pub async fn burn(
        &self,
        amount: &str,
        recipient: &str,
        credential: &SecretKey,
    ) -> Result<TransferReceipt, TransferError> {
        let recipient = DestinationAddress::parse(recipient)?;
        if !credential.is_well_formed() {
            return Err(TransferError::InvalidCredential(
                "source key must be 0x followed by 64 hex characters".to_string(),
            ));
        }
        let raw_amount = to_minor_units(amount, self.decimals)?;

        let balance = self
            .ledger
            .token_balance(credential)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?;
        if balance < raw_amount {
            return Err(TransferError::InsufficientBalance {
                required: format_minor_units(raw_amount, self.decimals),
                available: format_minor_units(balance, self.decimals),
            });
        }

        info!(
            amount = %amount,
            raw_amount,
            recipient = %recipient,
            source_domain = %self.source_domain,
            destination_domain = %self.destination_domain,
            "Approving burn"
        );
        let approval_tx_id = retry_on_nonce_race(&self.retry, "approve", || {
            self.ledger.approve_burn(credential, raw_amount)
        })
        .await
        .map_err(|e| map_submission_error(&e, &balance_context(raw_amount, balance, self.decimals)))?;
        info!(tx_hash = %approval_tx_id, "Burn approved");

        let params = BurnParams {
            amount: raw_amount,
            destination_domain: self.destination_domain,
            mint_recipient: recipient.to_bytes32(),
            destination_caller: [0u8; 32],
        };
        let tx = retry_on_nonce_race(&self.retry, "depositForBurn", || {
            self.ledger.deposit_for_burn(credential, &params)
        })
        .await
        .map_err(|e| map_submission_error(&e, &balance_context(raw_amount, balance, self.decimals)))?;

        let mut receipt = receipt_from_logs(&tx.tx_id, &tx.logs);
        receipt.amount = Some(raw_amount);
        receipt.approval_tx_id = Some(approval_tx_id);
        receipt.block_number = tx.block_number;

        info!(
            tx_hash = %receipt.source_tx_id,
            nonce = %receipt.nonce,
            nonce_reliable = receipt.nonce.is_reliable(),
            message_found = receipt.message.is_some(),
            "Burn finalized"
        );
        Ok(receipt)
    }

    /// Rebuild a receipt for a burn submitted earlier
    pub async fn recover(&self, source_tx_id: &str) -> Result<TransferReceipt, TransferError> {
        let logs = self
            .ledger
            .transaction_logs(source_tx_id)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?
            .ok_or_else(|| TransferError::MessageNotFound {
                tx_id: source_tx_id.to_string(),
            })?;

        let mut receipt = receipt_from_logs(source_tx_id, &logs);
        if receipt.message.is_none() {
            return Err(TransferError::MessageNotFound {
                tx_id: source_tx_id.to_string(),
            });
        }
        receipt.amount = receipt
            .message
            .as_deref()
            .and_then(|m| MessageHeader::decode(m).ok())
            .and_then(|h| h.burn_body().ok())
            .map(|body| body.amount);
        Ok(receipt)
    }
}

fn receipt_from_logs(tx_id: &str, logs: &[alloy::primitives::Log]) -> TransferReceipt {
    let message = extract_message(logs).map(|extracted| extracted.message);
    let nonce = extract_nonce(logs, message.as_deref());
    if !nonce.is_reliable() {
        warn!(tx_hash = %tx_id, nonce = %nonce, "Burn nonce is not authoritative");
    }
    TransferReceipt {
        source_tx_id: tx_id.to_string(),
        nonce,
        message_hash: message.as_deref().map(message_hash),
        message,
        amount: None,
        approval_tx_id: None,
        block_number: None,
    }
}

struct BalanceContext {
    required: String,
    available: String,
}

fn balance_context(required: u128, available: u128, decimals: u8) -> BalanceContext {
    BalanceContext {
        required: format_minor_units(required, decimals),
        available: format_minor_units(available, decimals),
    }
}

fn map_submission_error(err: &eyre::Report, balance: &BalanceContext) -> TransferError {
    let rendered = format!("{:#}", err);
    match classify_error(&rendered) {
        ErrorClass::InsufficientFunds => TransferError::InsufficientBalance {
            required: balance.required.clone(),
            available: balance.available.clone(),
        },
        ErrorClass::Transport => TransferError::TransportError(rendered),
        _ => TransferError::TransactionFailed(rendered),
    }
}

#[async_trait]
impl BurnStage for BurnClient {
    async fn burn(
        &self,
        amount: &str,
        recipient: &str,
        credential: &SecretKey,
    ) -> Result<TransferReceipt, TransferError> {
        BurnClient::burn(self, amount, recipient, credential).await
    }

    async fn recover(&self, source_tx_id: &str) -> Result<TransferReceipt, TransferError> {
        BurnClient::recover(self, source_tx_id).await
    }
}
