//! Common types for CCTP transfers
//!
//! Fixed-width identifiers shared by the burn, attestation, and mint stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TransferError;
use crate::hash::address_to_bytes32;

/// CCTP domain identifier
///
/// Domains are assigned by Circle and route messages between chains
/// (e.g. 6 = Base, 9 = Aptos).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DomainId(pub u32);

impl DomainId {
    pub const BASE: DomainId = DomainId(6);
    pub const APTOS: DomainId = DomainId(9);
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DomainId {
    fn from(id: u32) -> Self {
        DomainId(id)
    }
}

/// EVM address (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, TransferError> {
        let bytes = decode_fixed::<20>(hex)?;
        Ok(EvmAddress(bytes))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Left-padded 32-byte form
    pub fn as_bytes32(&self) -> [u8; 32] {
        address_to_bytes32(&self.0)
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Destination-chain account address (32 bytes, `0x` + 64 hex characters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationAddress(pub [u8; 32]);

impl DestinationAddress {
    /// Hex characters required after the `0x` prefix
    pub const HEX_LEN: usize = 64;

    /// Parse a full-width destination address.
    ///
    /// Short-form addresses (e.g. `0x1`) are rejected; the destination ledger's
    /// fixed width is enforced before anything reaches a ledger client.
    pub fn parse(raw: &str) -> Result<Self, TransferError> {
        let hex = raw.strip_prefix("0x").ok_or_else(|| {
            TransferError::InvalidAddressFormat(format!("{}: missing 0x prefix", raw))
        })?;
        if hex.len() != Self::HEX_LEN {
            return Err(TransferError::InvalidAddressFormat(format!(
                "{}: expected {} hex characters, got {}",
                raw,
                Self::HEX_LEN,
                hex.len()
            )));
        }
        Ok(DestinationAddress(decode_fixed::<32>(hex)?))
    }

    /// Left-pad a 20-byte source-chain address to the destination width
    pub fn from_evm(addr: &EvmAddress) -> Self {
        DestinationAddress(addr.as_bytes32())
    }

    /// The `mintRecipient` word passed to the burn
    pub fn to_bytes32(&self) -> [u8; 32] {
        self.0
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for DestinationAddress {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DestinationAddress::parse(s)
    }
}

impl Serialize for DestinationAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DestinationAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DestinationAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// keccak256 fingerprint of a CCTP message (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageHash(pub [u8; 32]);

impl MessageHash {
    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, TransferError> {
        Ok(MessageHash(decode_fixed::<32>(hex)?))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for MessageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MessageHash::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serialize byte payloads as 0x-prefixed hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optional byte payloads as 0x-prefixed hex or null
pub(crate) mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => super::hex_bytes::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::decode_hex(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Decode hex with an optional 0x prefix
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, TransferError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped)
        .map_err(|e| TransferError::InvalidAddressFormat(format!("{}: {}", raw, e)))
}

fn decode_fixed<const N: usize>(raw: &str) -> Result<[u8; N], TransferError> {
    let bytes = decode_hex(raw)?;
    if bytes.len() != N {
        return Err(TransferError::InvalidAddressFormat(format!(
            "{}: expected {} bytes, got {}",
            raw,
            N,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APTOS_ADDR: &str = "0x69091fbab5f7d635ee7ac5098cf0c1efbe31d68fec0f2cd565e8d168daf52832";

    #[test]
    fn test_destination_address_parse() {
        let addr = DestinationAddress::parse(APTOS_ADDR).unwrap();
        assert_eq!(addr.to_hex(), APTOS_ADDR);
    }

    #[test]
    fn test_destination_address_rejects_short() {
        let err = DestinationAddress::parse("0x12345678").unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS_FORMAT");
        assert!(DestinationAddress::parse("0x1").is_err());
    }

    #[test]
    fn test_destination_address_rejects_missing_prefix() {
        assert!(DestinationAddress::parse(&APTOS_ADDR[2..]).is_err());
    }

    #[test]
    fn test_destination_address_rejects_non_hex() {
        let raw = format!("0x{}", "g".repeat(64));
        assert!(DestinationAddress::parse(&raw).is_err());
    }

    #[test]
    fn test_destination_from_evm_left_pads() {
        let evm = EvmAddress::from_hex("0x036CbD53842c5426634e7929541eC2318f3dCF7e").unwrap();
        let dest = DestinationAddress::from_evm(&evm);
        assert_eq!(
            dest.to_hex(),
            "0x000000000000000000000000036cbd53842c5426634e7929541ec2318f3dcf7e"
        );
    }

    #[test]
    fn test_message_hash_serde_as_hex() {
        let hash = MessageHash([0x11; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(32)));
        let back: MessageHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_domain_constants() {
        assert_eq!(DomainId::BASE.to_string(), "6");
        assert_eq!(DomainId::APTOS, DomainId::from(9));
    }
}
