//! Source-chain event parsing
//!
//! The burn transaction's receipt carries the CCTP message, but the event shape
//! has not been stable across contract versions. Extraction walks an ordered
//! list of [`EventMatcher`]s and uses the first one that matches any log.

use alloy::primitives::{Address, Bytes, Log, LogData, B256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::message::MessageHeader;

sol! {
    /// Emitted by MessageTransmitter for every outbound message
    event MessageSent(bytes message);

    /// Emitted by TokenMessenger when USDC is burned
    event DepositForBurn(
        uint64 indexed nonce,
        address indexed burnToken,
        uint256 amount,
        address indexed depositor,
        bytes32 mintRecipient,
        uint32 destinationDomain,
        bytes32 destinationTokenMessenger,
        bytes32 destinationCaller
    );
}

/// A known event shape and how to pull message bytes out of it
pub struct EventMatcher {
    pub name: &'static str,
    pub topic: B256,
    extract: fn(&LogData) -> Option<Vec<u8>>,
}

impl EventMatcher {
    /// Message bytes if `log` has this matcher's shape
    pub fn extract(&self, log: &Log) -> Option<Vec<u8>> {
        if log.data.topics().first() != Some(&self.topic) {
            return None;
        }
        (self.extract)(&log.data)
    }
}

impl fmt::Debug for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMatcher")
            .field("name", &self.name)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Matchers in priority order
pub static MESSAGE_MATCHERS: &[EventMatcher] = &[
    EventMatcher {
        name: "MessageSent(bytes)",
        topic: MessageSent::SIGNATURE_HASH,
        extract: extract_message_sent,
    },
    // Older deployments were observed without MessageSent in the receipt; the
    // burn event's raw data is the only payload available then.
    EventMatcher {
        name: "DepositForBurn",
        topic: DepositForBurn::SIGNATURE_HASH,
        extract: extract_raw_data,
    },
];

/// Message bytes located in a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub message: Vec<u8>,
    /// Name of the matcher that produced the bytes
    pub matched: &'static str,
    /// Position of the matching log within the receipt
    pub log_index: usize,
}

/// Find the CCTP message in a transaction's logs
pub fn extract_message(logs: &[Log]) -> Option<ExtractedMessage> {
    for matcher in MESSAGE_MATCHERS {
        for (log_index, log) in logs.iter().enumerate() {
            if let Some(message) = matcher.extract(log) {
                debug!(
                    matcher = matcher.name,
                    log_index,
                    len = message.len(),
                    "Extracted CCTP message"
                );
                return Some(ExtractedMessage {
                    message,
                    matched: matcher.name,
                    log_index,
                });
            }
        }
    }
    None
}

fn extract_message_sent(data: &LogData) -> Option<Vec<u8>> {
    let message = decode_abi_bytes(data.data.as_ref())?;
    if message.is_empty() {
        return None;
    }
    Some(message)
}

fn extract_raw_data(data: &LogData) -> Option<Vec<u8>> {
    if data.data.is_empty() {
        return None;
    }
    Some(data.data.to_vec())
}

/// Decode a single dynamic `bytes` argument from ABI-encoded event data
///
/// Layout: `[offset (32)][length (32)][payload, right-padded]`
fn decode_abi_bytes(data: &[u8]) -> Option<Vec<u8>> {
    let offset = read_word_usize(data, 0)?;
    let len = read_word_usize(data, offset)?;
    let start = offset.checked_add(32)?;
    let end = start.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    Some(data[start..end].to_vec())
}

fn read_word_usize(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(32)?)?;
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..32]);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Where the burn nonce came from
///
/// Only [`BurnNonce::Event`] and [`BurnNonce::Header`] are authoritative. The
/// heuristic reads `topics[1]` of the first log in the receipt, which is usually
/// an ERC-20 `Transfer`/`Approval` topic rather than a nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum BurnNonce {
    /// Indexed nonce of `DepositForBurn`
    Event(u64),
    /// Nonce field of the decoded message header
    Header(u64),
    /// First log's second topic (best-effort, unreliable)
    Heuristic(String),
    /// Nothing recognizable in the receipt
    Unknown,
}

impl BurnNonce {
    /// Sentinel rendered for [`BurnNonce::Unknown`]
    pub const SENTINEL: &'static str = "0";

    pub fn is_reliable(&self) -> bool {
        matches!(self, BurnNonce::Event(_) | BurnNonce::Header(_))
    }

    /// Numeric nonce, only when it is authoritative
    pub fn value(&self) -> Option<u64> {
        match self {
            BurnNonce::Event(n) | BurnNonce::Header(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for BurnNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurnNonce::Event(n) | BurnNonce::Header(n) => write!(f, "{}", n),
            BurnNonce::Heuristic(topic) => write!(f, "{}", topic),
            BurnNonce::Unknown => f.write_str(Self::SENTINEL),
        }
    }
}

/// Determine the burn nonce from the receipt and, if known, the message bytes
pub fn extract_nonce(logs: &[Log], message: Option<&[u8]>) -> BurnNonce {
    for log in logs {
        let topics = log.data.topics();
        if topics.first() != Some(&DepositForBurn::SIGNATURE_HASH) || topics.len() < 2 {
            continue;
        }
        let word = topics[1];
        if word[..24].iter().all(|b| *b == 0) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&word[24..32]);
            return BurnNonce::Event(u64::from_be_bytes(buf));
        }
    }

    if let Some(message) = message {
        if let Ok(header) = MessageHeader::decode(message) {
            return BurnNonce::Header(header.nonce);
        }
    }

    if let Some(topic) = logs.first().and_then(|log| log.data.topics().get(1)) {
        warn!(
            topic = %topic,
            "Burn nonce taken from first log topic; value is best-effort"
        );
        return BurnNonce::Heuristic(topic.to_string());
    }

    warn!("No burn nonce found in receipt");
    BurnNonce::Unknown
}

/// Build a `MessageSent` log carrying `message`
pub fn message_sent_log(emitter: Address, message: &[u8]) -> Log {
    let mut data = Vec::with_capacity(64 + message.len().div_ceil(32) * 32);
    data.extend_from_slice(&word_from_u64(32));
    data.extend_from_slice(&word_from_u64(message.len() as u64));
    data.extend_from_slice(message);
    let padding = (32 - message.len() % 32) % 32;
    data.extend(std::iter::repeat(0u8).take(padding));

    Log::new_unchecked(emitter, vec![MessageSent::SIGNATURE_HASH], Bytes::from(data))
}

/// Build a `DepositForBurn` log with the given indexed nonce
pub fn deposit_for_burn_log(
    emitter: Address,
    nonce: u64,
    burn_token: Address,
    depositor: Address,
    amount: u128,
    mint_recipient: [u8; 32],
    destination_domain: u32,
) -> Log {
    let topics = vec![
        DepositForBurn::SIGNATURE_HASH,
        B256::from(word_from_u64(nonce)),
        B256::left_padding_from(burn_token.as_slice()),
        B256::left_padding_from(depositor.as_slice()),
    ];

    let mut data = Vec::with_capacity(5 * 32);
    let mut amount_word = [0u8; 32];
    amount_word[16..].copy_from_slice(&amount.to_be_bytes());
    data.extend_from_slice(&amount_word);
    data.extend_from_slice(&mint_recipient);
    data.extend_from_slice(&word_from_u64(destination_domain as u64));
    data.extend_from_slice(&[0u8; 32]);
    data.extend_from_slice(&[0u8; 32]);

    Log::new_unchecked(emitter, topics, Bytes::from(data))
}

fn word_from_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
