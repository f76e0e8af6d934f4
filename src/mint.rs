//! Destination-chain mint client
//!
//! `mint(message, attestation, credential) -> MintOutcome`
//!
//! The minted amount is the recipient's balance delta across the receive
//! transaction, not a value read from the transaction's events. A receive the
//! destination rejects still comes back as an outcome with `success == false`
//! so the landed transaction stays on record. Failures here are terminal; the
//! client never resubmits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::ledger::DestinationLedger;
use crate::message::MessageHeader;
use crate::redact::SecretKey;
use crate::stage::MintStage;
use crate::types::DestinationAddress;

/// Result of a receive transaction that landed on the destination ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintOutcome {
    pub dest_tx_id: String,
    pub success: bool,
    pub vm_status: String,
    pub recipient: DestinationAddress,
    /// Balance delta in destination minor units
    pub minted_amount: u128,
    pub balance_before: u128,
    pub balance_after: u128,
    /// Set when the asset store had to be registered first
    pub registration_tx_id: Option<String>,
}

/// Receives CCTP messages on the destination chain
pub struct MintClient {
    ledger: Arc<dyn DestinationLedger>,
}

impl MintClient {
    pub fn new(ledger: Arc<dyn DestinationLedger>) -> Self {
        Self { ledger }
    }

    pub async fn mint(
        &self,
        message: &[u8],
        attestation: &[u8],
        credential: &SecretKey,
    ) -> Result<MintOutcome, TransferError> {
        if message.is_empty() {
            return Err(TransferError::InvalidAttestationInput(
                "message bytes are empty".to_string(),
            ));
        }
        if attestation.is_empty() {
            return Err(TransferError::InvalidAttestationInput(
                "attestation bytes are empty".to_string(),
            ));
        }
        if !credential.is_well_formed() {
            return Err(TransferError::InvalidCredential(
                "destination key must be 0x followed by 64 hex characters".to_string(),
            ));
        }

        let header = MessageHeader::decode(message).ok();
        let signer = self
            .ledger
            .account_address(credential)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?;

        if let Some(ref header) = header {
            let used = self
                .ledger
                .is_nonce_used(header.source_domain, header.nonce)
                .await
                .map_err(|e| TransferError::from_collaborator(&e))?;
            if used {
                warn!(
                    source_domain = %header.source_domain,
                    nonce = header.nonce,
                    "Message already received, refusing to resubmit"
                );
                return Err(TransferError::MessageAlreadyReceived {
                    source_domain: header.source_domain.0,
                    nonce: header.nonce,
                });
            }
        } else {
            debug!("Message header not decodable, skipping replay pre-check");
        }

        let recipient = header
            .as_ref()
            .and_then(|h| h.burn_body().ok())
            .map(|body| DestinationAddress(body.mint_recipient))
            .unwrap_or(signer);

        let registration_tx_id = self.ensure_registered(credential, &signer, &recipient).await?;

        let balance_before = self.balance(&recipient).await?;
        info!(
            recipient = %recipient,
            balance_before,
            message_len = message.len(),
            "Submitting receive_message"
        );

        let tx = self
            .ledger
            .receive_message(credential, message, attestation)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?;

        if !tx.success {
            warn!(tx_hash = %tx.tx_id, vm_status = %tx.vm_status, "receive_message rejected");
            return Ok(MintOutcome {
                dest_tx_id: tx.tx_id,
                success: false,
                vm_status: tx.vm_status,
                recipient,
                minted_amount: 0,
                balance_before,
                balance_after: balance_before,
                registration_tx_id,
            });
        }

        let balance_after = self.balance(&recipient).await?;
        if balance_after < balance_before {
            warn!(
                recipient = %recipient,
                balance_before,
                balance_after,
                "Balance decreased across mint; reporting zero minted"
            );
        }
        let minted_amount = balance_after.saturating_sub(balance_before);

        info!(
            tx_hash = %tx.tx_id,
            minted_amount,
            balance_after,
            "Mint confirmed"
        );

        Ok(MintOutcome {
            dest_tx_id: tx.tx_id,
            success: true,
            vm_status: tx.vm_status,
            recipient,
            minted_amount,
            balance_before,
            balance_after,
            registration_tx_id,
        })
    }

    /// Register the signer's asset store when the recipient is the signer and
    /// cannot hold the asset yet
    async fn ensure_registered(
        &self,
        credential: &SecretKey,
        signer: &DestinationAddress,
        recipient: &DestinationAddress,
    ) -> Result<Option<String>, TransferError> {
        let registered = self
            .ledger
            .is_asset_registered(recipient)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?;
        if registered {
            return Ok(None);
        }

        if recipient != signer {
            warn!(
                recipient = %recipient,
                "Recipient has no asset store and is not the signer; mint may fail"
            );
            return Ok(None);
        }

        info!(account = %signer, "Registering asset store");
        let tx = self
            .ledger
            .register_asset(credential)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))?;
        if !tx.success {
            return Err(TransferError::TransactionFailed(format!(
                "asset registration failed: {}",
                tx.vm_status
            )));
        }
        Ok(Some(tx.tx_id))
    }

    async fn balance(&self, address: &DestinationAddress) -> Result<u128, TransferError> {
        self.ledger
            .asset_balance(address)
            .await
            .map_err(|e| TransferError::from_collaborator(&e))
    }
}

#[async_trait]
impl MintStage for MintClient {
    async fn mint(
        &self,
        message: &[u8],
        attestation: &[u8],
        credential: &SecretKey,
    ) -> Result<MintOutcome, TransferError> {
        MintClient::mint(self, message, attestation, credential).await
    }
}
