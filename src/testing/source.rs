use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, Log};
use async_trait::async_trait;
use eyre::{eyre, Result};

use super::lock;
use crate::events::{deposit_for_burn_log, message_sent_log};
use crate::ledger::{BurnParams, SourceLedger, SourceTx};
use crate::message::{encode_burn_body, encode_message};
use crate::redact::SecretKey;
use crate::types::{DestinationAddress, DomainId};

const TOKEN_MESSENGER: Address = Address::repeat_byte(0x28);
const MESSAGE_TRANSMITTER: Address = Address::repeat_byte(0x7a);
const USDC: Address = Address::repeat_byte(0x03);
const DEPOSITOR: Address = Address::repeat_byte(0x5e);

#[derive(Debug, Default)]
struct ScriptedFailure {
    remaining: usize,
    message: String,
}

impl ScriptedFailure {
    fn take(&mut self) -> Option<String> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.message.clone())
    }
}

/// Source ledger holding one account's balance and the logs of every burn
pub struct MockSourceLedger {
    balance: Mutex<u128>,
    logs: Mutex<HashMap<String, Vec<Log>>>,
    last_burn: Mutex<Option<BurnParams>>,
    approve_failures: Mutex<ScriptedFailure>,
    burn_failures: Mutex<ScriptedFailure>,
    nonce_failures: Mutex<ScriptedFailure>,
    unreachable: AtomicBool,
    next_nonce: AtomicU64,
    next_tx: AtomicU64,
    approve_count: AtomicUsize,
    burn_count: AtomicUsize,
    nonce_queries: AtomicUsize,
    total_calls: AtomicUsize,
}

impl Default for MockSourceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSourceLedger {
    /// Ledger with a zero balance
    pub fn new() -> Self {
        Self::with_balance(0)
    }

    pub fn with_balance(balance: u128) -> Self {
        Self {
            balance: Mutex::new(balance),
            logs: Mutex::new(HashMap::new()),
            last_burn: Mutex::new(None),
            approve_failures: Mutex::new(ScriptedFailure::default()),
            burn_failures: Mutex::new(ScriptedFailure::default()),
            nonce_failures: Mutex::new(ScriptedFailure::default()),
            unreachable: AtomicBool::new(false),
            next_nonce: AtomicU64::new(1),
            next_tx: AtomicU64::new(1),
            approve_count: AtomicUsize::new(0),
            burn_count: AtomicUsize::new(0),
            nonce_queries: AtomicUsize::new(0),
            total_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_balance(&self, balance: u128) {
        *lock(&self.balance) = balance;
    }

    pub fn balance(&self) -> u128 {
        *lock(&self.balance)
    }

    /// Fail the next `times` approvals with `message`
    pub fn fail_approve_times(&self, times: usize, message: &str) {
        *lock(&self.approve_failures) = ScriptedFailure {
            remaining: times,
            message: message.to_string(),
        };
    }

    /// Fail the next `times` burn submissions with `message`
    pub fn fail_burn_times(&self, times: usize, message: &str) {
        *lock(&self.burn_failures) = ScriptedFailure {
            remaining: times,
            message: message.to_string(),
        };
    }

    /// Fail the next `times` account nonce queries with `message`
    pub fn fail_nonce_times(&self, times: usize, message: &str) {
        *lock(&self.nonce_failures) = ScriptedFailure {
            remaining: times,
            message: message.to_string(),
        };
    }

    /// Every call fails with a connection error while set
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_transaction_logs(&self, tx_id: &str, logs: Vec<Log>) {
        lock(&self.logs).insert(tx_id.to_string(), logs);
    }

    /// Record a finalized burn that this mock never submitted; returns its tx id
    pub fn seed_burn(&self, nonce: u64, amount: u128, recipient: &DestinationAddress) -> String {
        let tx_id = self.next_tx_id();
        let logs = burn_logs(nonce, DomainId::APTOS, amount, recipient.to_bytes32());
        self.set_transaction_logs(&tx_id, logs);
        tx_id
    }

    pub fn last_burn_params(&self) -> Option<BurnParams> {
        lock(&self.last_burn).clone()
    }

    pub fn approve_count(&self) -> usize {
        self.approve_count.load(Ordering::SeqCst)
    }

    pub fn burn_count(&self) -> usize {
        self.burn_count.load(Ordering::SeqCst)
    }

    pub fn nonce_query_count(&self) -> usize {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(eyre!("error sending request: connection refused"));
        }
        Ok(())
    }

    fn next_tx_id(&self) -> String {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        format!("0x{:064x}", n)
    }
}

/// `DepositForBurn` followed by `MessageSent`, as the token messenger emits them
fn burn_logs(
    nonce: u64,
    destination_domain: DomainId,
    amount: u128,
    mint_recipient: [u8; 32],
) -> Vec<Log> {
    let body = encode_burn_body(USDC.into_word().0, mint_recipient, amount);
    let message = encode_message(DomainId::BASE, destination_domain, nonce, &body);
    vec![
        deposit_for_burn_log(
            TOKEN_MESSENGER,
            nonce,
            USDC,
            DEPOSITOR,
            amount,
            mint_recipient,
            destination_domain.0,
        ),
        message_sent_log(MESSAGE_TRANSMITTER, &message),
    ]
}

#[async_trait]
impl SourceLedger for MockSourceLedger {
    async fn token_balance(&self, _credential: &SecretKey) -> Result<u128> {
        self.enter()?;
        Ok(self.balance())
    }

    async fn approve_burn(&self, _credential: &SecretKey, amount: u128) -> Result<String> {
        self.enter()?;
        self.approve_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.approve_failures).take() {
            return Err(eyre!(message));
        }
        if amount > self.balance() {
            return Err(eyre!("insufficient funds for approval"));
        }
        Ok(self.next_tx_id())
    }

    async fn deposit_for_burn(&self, _credential: &SecretKey, params: &BurnParams) -> Result<SourceTx> {
        self.enter()?;
        self.burn_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.burn_failures).take() {
            return Err(eyre!(message));
        }

        {
            let mut balance = lock(&self.balance);
            if params.amount > *balance {
                return Err(eyre!("execution reverted: ERC20: transfer amount exceeds balance"));
            }
            *balance -= params.amount;
        }
        *lock(&self.last_burn) = Some(params.clone());

        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let logs = burn_logs(
            nonce,
            params.destination_domain,
            params.amount,
            params.mint_recipient,
        );
        let tx_id = self.next_tx_id();
        self.set_transaction_logs(&tx_id, logs.clone());

        Ok(SourceTx {
            tx_id,
            block_number: Some(1_000 + nonce),
            logs,
        })
    }

    async fn transaction_logs(&self, tx_id: &str) -> Result<Option<Vec<Log>>> {
        self.enter()?;
        Ok(lock(&self.logs).get(tx_id).cloned())
    }

    async fn account_nonce(&self, _credential: &SecretKey) -> Result<u64> {
        self.enter()?;
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.nonce_failures).take() {
            return Err(eyre!("{}", message));
        }
        Ok(self.next_tx.load(Ordering::SeqCst))
    }

    async fn block_number(&self) -> Result<u64> {
        self.enter()?;
        Ok(1_000 + self.next_nonce.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{extract_message, extract_nonce, BurnNonce};
    use crate::testing::{TEST_KEY, TEST_RECIPIENT};

    #[tokio::test]
    async fn test_burn_emits_decodable_logs() {
        let ledger = MockSourceLedger::with_balance(5);
        let key = SecretKey::parse(TEST_KEY).unwrap();
        let recipient = DestinationAddress::parse(TEST_RECIPIENT).unwrap();
        let params = BurnParams {
            amount: 3,
            destination_domain: DomainId::APTOS,
            mint_recipient: recipient.to_bytes32(),
            destination_caller: [0u8; 32],
        };

        let tx = ledger.deposit_for_burn(&key, &params).await.unwrap();
        assert_eq!(ledger.balance(), 2);

        let extracted = extract_message(&tx.logs).unwrap();
        assert_eq!(extract_nonce(&tx.logs, Some(&extracted.message)), BurnNonce::Event(1));
        let stored = ledger.transaction_logs(&tx.tx_id).await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_counts_calls() {
        let ledger = MockSourceLedger::new();
        ledger.set_unreachable(true);
        assert!(ledger.block_number().await.is_err());
        assert_eq!(ledger.total_calls(), 1);
    }
}
