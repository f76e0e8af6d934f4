//! Attestation authority types, HTTP client, and poller
//!
//! The authority (Circle Iris) signs each burn message once the source chain
//! reaches finality. Records move `pending -> complete` or `pending -> failed`
//! and never change after that.

pub mod client;
pub mod poller;

pub use client::{AttestationApi, IrisClient};
pub use poller::{AttestationPoller, PollTarget};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{decode_hex, hex_bytes, MessageHash};

/// Attestation status as reported by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Pending,
    Complete,
    Failed,
}

impl AttestationStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationStatus::Pending => "pending",
            AttestationStatus::Complete => "complete",
            AttestationStatus::Failed => "failed",
        }
    }

    /// Complete and failed records never change
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttestationStatus::Complete | AttestationStatus::Failed)
    }
}

impl fmt::Display for AttestationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `GET /v1/attestations/{messageHash}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub status: String,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AttestationResponse {
    /// Response equivalent to HTTP 404
    pub fn pending() -> Self {
        Self {
            status: "pending".to_string(),
            attestation: None,
            message: None,
        }
    }

    /// Parsed status; anything other than `complete`/`failed` is still pending
    /// (the authority also reports `pending_confirmations`)
    pub fn status(&self) -> AttestationStatus {
        match self.status.as_str() {
            "complete" => AttestationStatus::Complete,
            "failed" => AttestationStatus::Failed,
            _ => AttestationStatus::Pending,
        }
    }

    /// Decoded signature bytes; `None` when absent, placeholder, or not hex
    pub fn attestation_bytes(&self) -> Option<Vec<u8>> {
        decode_optional_hex(self.attestation.as_deref())
    }

    /// Decoded message bytes; `None` when absent or not hex
    pub fn message_bytes(&self) -> Option<Vec<u8>> {
        decode_optional_hex(self.message.as_deref())
    }
}

fn decode_optional_hex(raw: Option<&str>) -> Option<Vec<u8>> {
    let raw = raw?;
    if !raw.starts_with("0x") {
        // e.g. "PENDING"
        return None;
    }
    decode_hex(raw).ok().filter(|bytes| !bytes.is_empty())
}

/// Attestation state for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub status: AttestationStatus,
    pub message_hash: MessageHash,
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub attestation: Vec<u8>,
}

impl AttestationRecord {
    pub fn pending(message_hash: MessageHash) -> Self {
        Self {
            status: AttestationStatus::Pending,
            message_hash,
            message: Vec::new(),
            attestation: Vec::new(),
        }
    }

    /// Ready to hand to the mint stage
    pub fn is_valid(&self) -> bool {
        self.status == AttestationStatus::Complete
            && !self.message.is_empty()
            && !self.attestation.is_empty()
            && self.message_hash != MessageHash::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_mapping() {
        let complete: AttestationResponse =
            serde_json::from_str(r#"{"status":"complete","attestation":"0xabcd"}"#).unwrap();
        assert_eq!(complete.status(), AttestationStatus::Complete);
        assert_eq!(complete.attestation_bytes(), Some(vec![0xab, 0xcd]));
        assert_eq!(complete.message_bytes(), None);

        let confirming: AttestationResponse = serde_json::from_str(
            r#"{"status":"pending_confirmations","attestation":"PENDING"}"#,
        )
        .unwrap();
        assert_eq!(confirming.status(), AttestationStatus::Pending);
        assert_eq!(confirming.attestation_bytes(), None);

        assert_eq!(
            AttestationResponse::pending().status(),
            AttestationStatus::Pending
        );
    }

    #[test]
    fn test_record_validity() {
        let hash = MessageHash([7u8; 32]);
        let mut record = AttestationRecord::pending(hash);
        assert!(!record.is_valid());

        record.status = AttestationStatus::Complete;
        record.message = vec![1, 2, 3];
        assert!(!record.is_valid(), "attestation missing");

        record.attestation = vec![4, 5];
        assert!(record.is_valid());

        record.message_hash = MessageHash::default();
        assert!(!record.is_valid());
    }

    #[test]
    fn test_record_serializes_hex() {
        let record = AttestationRecord {
            status: AttestationStatus::Failed,
            message_hash: MessageHash([1u8; 32]),
            message: vec![0xde, 0xad],
            attestation: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "0xdead");
        assert_eq!(json["attestation"], "0x");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!AttestationStatus::Pending.is_terminal());
        assert!(AttestationStatus::Complete.is_terminal());
        assert!(AttestationStatus::Failed.is_terminal());
    }
}
