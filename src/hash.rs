//! Hash computation for CCTP message identifiers
//!
//! The attestation authority indexes messages by `keccak256(message_bytes)`,
//! where `message_bytes` is the raw payload emitted by the source chain's
//! `MessageSent` event.

use tiny_keccak::{Hasher, Keccak};

use crate::types::MessageHash;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Message identifier used to query the attestation authority
pub fn message_hash(message: &[u8]) -> MessageHash {
    MessageHash(keccak256(message))
}

/// Left-pad a 20-byte EVM address into a 32-byte word
pub fn address_to_bytes32(addr: &[u8; 20]) -> [u8; 32] {
    let mut result = [0u8; 32];
    result[12..32].copy_from_slice(addr);
    result
}

/// Extract the EVM address from a left-padded 32-byte word
pub fn bytes32_to_address(bytes: &[u8; 32]) -> [u8; 20] {
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes[12..32]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        let hash = keccak256(&[]);
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_message_hash_matches_keccak() {
        let message = b"cctp message";
        assert_eq!(message_hash(message).0, keccak256(message));
    }

    #[test]
    fn test_address_bytes32_roundtrip() {
        let addr = [0xabu8; 20];
        let word = address_to_bytes32(&addr);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(bytes32_to_address(&word), addr);
    }
}
