//! CCTP message decoding
//!
//! Layout of the version-0 message emitted by `MessageTransmitter`:
//!
//! | offset | size | field              |
//! |--------|------|--------------------|
//! | 0      | 4    | version            |
//! | 4      | 4    | sourceDomain       |
//! | 8      | 4    | destinationDomain  |
//! | 12     | 8    | nonce              |
//! | 20     | 32   | sender             |
//! | 52     | 32   | recipient          |
//! | 84     | 32   | destinationCaller  |
//! | 116    | ..   | messageBody        |
//!
//! The body of a token transfer is a burn message:
//! version (4), burnToken (32), mintRecipient (32), amount (32), messageSender (32).

use eyre::{eyre, Result};

use crate::types::DomainId;

const HEADER_LEN: usize = 116;
const BURN_BODY_LEN: usize = 132;

/// Decoded message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u32,
    pub source_domain: DomainId,
    pub destination_domain: DomainId,
    pub nonce: u64,
    pub sender: [u8; 32],
    pub recipient: [u8; 32],
    pub destination_caller: [u8; 32],
    pub body: Vec<u8>,
}

impl MessageHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(eyre!(
                "Message too short: {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            ));
        }

        let version = read_u32(bytes, 0);
        if version != 0 {
            return Err(eyre!("Unsupported message version {}", version));
        }

        Ok(MessageHeader {
            version,
            source_domain: DomainId(read_u32(bytes, 4)),
            destination_domain: DomainId(read_u32(bytes, 8)),
            nonce: u64::from_be_bytes(fixed::<8>(bytes, 12)),
            sender: fixed::<32>(bytes, 20),
            recipient: fixed::<32>(bytes, 52),
            destination_caller: fixed::<32>(bytes, 84),
            body: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Decode the body as a token burn message
    pub fn burn_body(&self) -> Result<BurnBody> {
        BurnBody::decode(&self.body)
    }
}

/// Token burn payload carried in the message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnBody {
    pub version: u32,
    pub burn_token: [u8; 32],
    pub mint_recipient: [u8; 32],
    /// Burned amount in source minor units
    pub amount: u128,
    pub message_sender: [u8; 32],
}

impl BurnBody {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BURN_BODY_LEN {
            return Err(eyre!(
                "Burn body too short: {} bytes, need {}",
                bytes.len(),
                BURN_BODY_LEN
            ));
        }

        let amount_word = fixed::<32>(bytes, 68);
        if amount_word[..16].iter().any(|b| *b != 0) {
            return Err(eyre!("Burn amount exceeds u128"));
        }
        let amount = u128::from_be_bytes(fixed::<16>(&amount_word, 16));

        Ok(BurnBody {
            version: read_u32(bytes, 0),
            burn_token: fixed::<32>(bytes, 4),
            mint_recipient: fixed::<32>(bytes, 36),
            amount,
            message_sender: fixed::<32>(bytes, 100),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(fixed::<4>(bytes, offset))
}

// Callers check lengths before slicing.
fn fixed<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

/// Build a version-0 message, used by tests and substitute ledgers
pub fn encode_message(
    source_domain: DomainId,
    destination_domain: DomainId,
    nonce: u64,
    body: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&source_domain.0.to_be_bytes());
    out.extend_from_slice(&destination_domain.0.to_be_bytes());
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(body);
    out
}

/// Build a burn message body
pub fn encode_burn_body(burn_token: [u8; 32], mint_recipient: [u8; 32], amount: u128) -> Vec<u8> {
    let mut out = Vec::with_capacity(BURN_BODY_LEN);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&burn_token);
    out.extend_from_slice(&mint_recipient);
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&amount.to_be_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out
}
