//! CCTP-Relay: Burn → Attest → Mint Transfer Coordinator
//!
//! Moves USDC from Base to Aptos over Circle's Cross-Chain Transfer Protocol:
//!
//! - **Burn** - approve and `depositForBurn` on the source chain, then capture
//!   the emitted message and nonce from the receipt logs
//! - **Attestation** - poll the attestation authority until the message is
//!   signed, bounded by wall-clock time and attempt count
//! - **Mint** - submit message + attestation on the destination chain and
//!   report the recipient's balance delta
//! - **Orchestrator** - sequences the three stages and returns a
//!   [`TransferResult`] for every attempt, successful or not
//!
//! Ledger RPC clients are not part of this crate. Callers plug them in through
//! [`SourceLedger`] and [`DestinationLedger`]; the Iris HTTP client is provided
//! as [`IrisClient`].
//!
//! ## Feature Flags
//!
//! - `testing` - In-memory ledgers and attestation authority (default)

// Core types and codecs
pub mod amount;
pub mod error;
pub mod events;
pub mod hash;
pub mod message;
pub mod redact;
pub mod types;

// Runtime support
pub mod cache;
pub mod config;
pub mod progress;
pub mod retry;
pub mod state;

// Pipeline
pub mod attestation;
pub mod burn;
pub mod ledger;
pub mod mint;
pub mod orchestrator;
pub mod stage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use attestation::{
    AttestationApi, AttestationPoller, AttestationRecord, AttestationResponse, AttestationStatus,
    IrisClient, PollTarget,
};
pub use burn::{BurnClient, TransferReceipt};
pub use config::{AttestationConfig, Config, DestinationChainConfig, SourceChainConfig};
pub use error::TransferError;
pub use events::BurnNonce;
pub use ledger::{BurnParams, DestinationLedger, DestinationTx, ReceiveEvent, SourceLedger, SourceTx};
pub use mint::{MintClient, MintOutcome};
pub use orchestrator::{
    ResumeRequest, StepLedger, TransferEstimate, TransferHistoryEntry, TransferOrchestrator,
    TransferRequest, TransferResult,
};
pub use progress::{ChannelSink, ProgressEvent, ProgressSink};
pub use redact::{Redacted, SecretKey};
pub use retry::RetryConfig;
pub use stage::{AttestationStage, BurnStage, MintStage};
pub use state::TransferPhase;
pub use types::{DestinationAddress, DomainId, EvmAddress, MessageHash};
