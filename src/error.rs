//! Transfer error types
//!
//! Every stage of the pipeline reports failures as a [`TransferError`]. Ledger and
//! HTTP collaborators speak `eyre::Result`; stage clients translate those into
//! this taxonomy with [`TransferError::from_collaborator`].

use thiserror::Error;

use crate::retry::{classify_error, ErrorClass};

/// Failure of a transfer attempt or one of its stages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid attestation input: {0}")]
    InvalidAttestationInput(String),

    // === Attestation Errors ===
    #[error("No CCTP message found in transaction {tx_id}")]
    MessageNotFound { tx_id: String },

    #[error("Attestation failed for message {message_hash}")]
    AttestationFailed { message_hash: String },

    #[error("Attestation timed out after {attempts} polls ({elapsed_ms} ms)")]
    AttestationTimeout { attempts: u32, elapsed_ms: u64 },

    // === Ledger Errors ===
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Message already received (source domain {source_domain}, nonce {nonce})")]
    MessageAlreadyReceived { source_domain: u32, nonce: u64 },

    #[error("Transport error: {0}")]
    TransportError(String),

    // === Internal ===
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl TransferError {
    /// Stable error code for reports
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::InvalidAddressFormat(_) => "INVALID_ADDRESS_FORMAT",
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            TransferError::InvalidAttestationInput(_) => "INVALID_ATTESTATION_INPUT",
            TransferError::MessageNotFound { .. } => "MESSAGE_NOT_FOUND",
            TransferError::AttestationFailed { .. } => "ATTESTATION_FAILED",
            TransferError::AttestationTimeout { .. } => "ATTESTATION_TIMEOUT",
            TransferError::TransactionFailed(_) => "TRANSACTION_FAILED",
            TransferError::MessageAlreadyReceived { .. } => "MESSAGE_ALREADY_RECEIVED",
            TransferError::TransportError(_) => "TRANSPORT_ERROR",
            TransferError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
        }
    }

    /// Whether a stage may absorb this error and try again.
    ///
    /// Only transport failures qualify, and only inside the poll loop and the
    /// burn nonce-race loop. Everything else is terminal for the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::TransportError(_))
    }

    /// Whether the error was raised before any ledger or network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TransferError::InsufficientBalance { .. }
                | TransferError::InvalidAddressFormat(_)
                | TransferError::InvalidAmount(_)
                | TransferError::InvalidCredential(_)
                | TransferError::InvalidAttestationInput(_)
        )
    }

    /// Map a collaborator error into the taxonomy using its rendered message
    pub fn from_collaborator(err: &eyre::Report) -> Self {
        let message = format!("{:#}", err);
        match classify_error(&message) {
            ErrorClass::Transport => TransferError::TransportError(message),
            _ => TransferError::TransactionFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::InvalidAddressFormat("0x12".into()).code(),
            "INVALID_ADDRESS_FORMAT"
        );
        assert_eq!(
            TransferError::AttestationTimeout {
                attempts: 150,
                elapsed_ms: 300_000
            }
            .code(),
            "ATTESTATION_TIMEOUT"
        );
        assert_eq!(
            TransferError::MessageAlreadyReceived {
                source_domain: 6,
                nonce: 1
            }
            .code(),
            "MESSAGE_ALREADY_RECEIVED"
        );
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(TransferError::TransportError("connection reset".into()).is_retryable());
        assert!(!TransferError::TransactionFailed("reverted".into()).is_retryable());
        assert!(!TransferError::AttestationFailed {
            message_hash: "0xab".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(TransferError::InvalidAmount("-1".into()).is_validation());
        assert!(!TransferError::TransportError("timeout".into()).is_validation());
    }

    #[test]
    fn test_from_collaborator() {
        let transport = eyre::eyre!("request timeout after 30s");
        assert!(matches!(
            TransferError::from_collaborator(&transport),
            TransferError::TransportError(_)
        ));

        let revert = eyre::eyre!("execution reverted: Nonce already used");
        assert!(matches!(
            TransferError::from_collaborator(&revert),
            TransferError::TransactionFailed(_)
        ));
    }

    #[test]
    fn test_display() {
        let err = TransferError::InsufficientBalance {
            required: "1.0".into(),
            available: "0.5".into(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 1.0, available 0.5"
        );
    }
}
