//! Ledger collaborator interfaces
//!
//! Transaction building, signing, and submission live outside this crate. The
//! pipeline talks to each chain through these traits; implementations are
//! long-lived, thread-safe handles shared across transfer attempts.
//!
//! Every submission method resolves only once the transaction is final (or has
//! failed) on its ledger.

use alloy::primitives::Log;
use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::redact::SecretKey;
use crate::types::{DestinationAddress, DomainId};

/// Arguments for `TokenMessenger.depositForBurn`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnParams {
    /// Amount in source minor units
    pub amount: u128,
    pub destination_domain: DomainId,
    pub mint_recipient: [u8; 32],
    /// Zero allows any caller to relay the message on the destination chain
    pub destination_caller: [u8; 32],
}

/// A finalized source-chain transaction and its event logs
#[derive(Debug, Clone)]
pub struct SourceTx {
    pub tx_id: String,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

/// Outcome of a destination-chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTx {
    pub tx_id: String,
    pub success: bool,
    /// Ledger status string (e.g. `Executed successfully` or a Move abort)
    pub vm_status: String,
}

/// A message received on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveEvent {
    pub tx_id: String,
    pub source_domain: DomainId,
    pub nonce: u64,
    /// Minted amount in destination minor units
    pub amount: u128,
    /// Seconds since the Unix epoch, when the ledger reports it
    pub timestamp: Option<u64>,
}

/// Source (burn) ledger operations
#[async_trait]
pub trait SourceLedger: Send + Sync {
    /// USDC balance of the credential's account, in minor units
    async fn token_balance(&self, credential: &SecretKey) -> Result<u128>;

    /// Authorize the token messenger to burn `amount`; returns the tx id
    async fn approve_burn(&self, credential: &SecretKey, amount: u128) -> Result<String>;

    /// Submit `depositForBurn` and wait for finality
    async fn deposit_for_burn(&self, credential: &SecretKey, params: &BurnParams) -> Result<SourceTx>;

    /// Logs of a finalized transaction, `None` if the ledger does not know it
    async fn transaction_logs(&self, tx_id: &str) -> Result<Option<Vec<Log>>>;

    /// Next account sequence number of the credential's account
    async fn account_nonce(&self, credential: &SecretKey) -> Result<u64>;

    /// Latest block number, used to check reachability
    async fn block_number(&self) -> Result<u64>;
}

/// Destination (mint) ledger operations
#[async_trait]
pub trait DestinationLedger: Send + Sync {
    /// Account controlled by the credential
    async fn account_address(&self, credential: &SecretKey) -> Result<DestinationAddress>;

    /// USDC balance in destination minor units
    async fn asset_balance(&self, address: &DestinationAddress) -> Result<u128>;

    /// Whether the account can already hold the asset
    async fn is_asset_registered(&self, address: &DestinationAddress) -> Result<bool>;

    /// Register the asset store for the credential's account
    async fn register_asset(&self, credential: &SecretKey) -> Result<DestinationTx>;

    /// Submit the receive/mint transaction and wait for its result.
    ///
    /// Implementations that need several on-chain calls must thread each call's
    /// receipt into the next one.
    async fn receive_message(
        &self,
        credential: &SecretKey,
        message: &[u8],
        attestation: &[u8],
    ) -> Result<DestinationTx>;

    /// Whether the message transmitter already consumed this nonce
    async fn is_nonce_used(&self, source_domain: DomainId, nonce: u64) -> Result<bool>;

    /// Whether the account exists on the ledger
    async fn account_exists(&self, address: &DestinationAddress) -> Result<bool>;

    /// Most recent received messages for the account, newest first
    async fn receive_events(
        &self,
        address: &DestinationAddress,
        limit: usize,
    ) -> Result<Vec<ReceiveEvent>>;
}
