use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::{eyre, Result};

use super::lock;
use crate::amount::rescale;
use crate::ledger::{DestinationLedger, DestinationTx, ReceiveEvent};
use crate::message::MessageHeader;
use crate::redact::SecretKey;
use crate::types::{DestinationAddress, DomainId};

const EXECUTED: &str = "Executed successfully";

/// Destination ledger with per-account balances and a used-nonce table.
///
/// `receive_message` decodes the burn body and credits its amount to the mint
/// recipient, the way the token minter does on chain. The burned amount is
/// rescaled from source to destination decimals (6 and 6 unless set).
pub struct MockDestinationLedger {
    signer: DestinationAddress,
    balances: Mutex<HashMap<DestinationAddress, u128>>,
    registered: Mutex<HashMap<DestinationAddress, bool>>,
    used_nonces: Mutex<HashSet<(DomainId, u64)>>,
    received: Mutex<Vec<(DestinationAddress, ReceiveEvent)>>,
    rejection: Mutex<Option<String>>,
    decimals: Mutex<(u8, u8)>,
    unreachable: AtomicBool,
    next_tx: AtomicU64,
    receive_count: AtomicUsize,
    register_count: AtomicUsize,
    total_calls: AtomicUsize,
}

impl MockDestinationLedger {
    /// Ledger whose every credential controls `signer`
    pub fn new(signer: DestinationAddress) -> Self {
        Self {
            signer,
            balances: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashMap::new()),
            used_nonces: Mutex::new(HashSet::new()),
            received: Mutex::new(Vec::new()),
            rejection: Mutex::new(None),
            decimals: Mutex::new((6, 6)),
            unreachable: AtomicBool::new(false),
            next_tx: AtomicU64::new(1),
            receive_count: AtomicUsize::new(0),
            register_count: AtomicUsize::new(0),
            total_calls: AtomicUsize::new(0),
        }
    }

    pub fn signer(&self) -> DestinationAddress {
        self.signer
    }

    pub fn set_balance(&self, address: DestinationAddress, balance: u128) {
        lock(&self.balances).insert(address, balance);
    }

    pub fn balance_of(&self, address: &DestinationAddress) -> u128 {
        lock(&self.balances).get(address).copied().unwrap_or(0)
    }

    /// Accounts are registered unless set otherwise
    pub fn set_registered(&self, address: DestinationAddress, registered: bool) {
        lock(&self.registered).insert(address, registered);
    }

    pub fn mark_nonce_used(&self, source_domain: DomainId, nonce: u64) {
        lock(&self.used_nonces).insert((source_domain, nonce));
    }

    /// Precision of the burned amount and of destination balances
    pub fn set_decimals(&self, source: u8, destination: u8) {
        *lock(&self.decimals) = (source, destination);
    }

    /// Every later receive aborts with `vm_status`
    pub fn reject_receive(&self, vm_status: &str) {
        *lock(&self.rejection) = Some(vm_status.to_string());
    }

    /// Every call fails with a connection error while set
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn receive_count(&self) -> usize {
        self.receive_count.load(Ordering::SeqCst)
    }

    pub fn register_count(&self) -> usize {
        self.register_count.load(Ordering::SeqCst)
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

    fn aborted(&self, vm_status: String) -> DestinationTx {
        DestinationTx {
            tx_id: self.next_tx_id(),
            success: false,
            vm_status,
        }
    }
}

#[async_trait]
impl DestinationLedger for MockDestinationLedger {
    async fn account_address(&self, _credential: &SecretKey) -> Result<DestinationAddress> {
        self.enter()?;
        Ok(self.signer)
    }

    async fn asset_balance(&self, address: &DestinationAddress) -> Result<u128> {
        self.enter()?;
        Ok(self.balance_of(address))
    }

    async fn is_asset_registered(&self, address: &DestinationAddress) -> Result<bool> {
        self.enter()?;
        Ok(lock(&self.registered).get(address).copied().unwrap_or(true))
    }

    async fn register_asset(&self, _credential: &SecretKey) -> Result<DestinationTx> {
        self.enter()?;
        self.register_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.registered).insert(self.signer, true);
        Ok(DestinationTx {
            tx_id: self.next_tx_id(),
            success: true,
            vm_status: EXECUTED.to_string(),
        })
    }

    async fn receive_message(
        &self,
        _credential: &SecretKey,
        message: &[u8],
        _attestation: &[u8],
    ) -> Result<DestinationTx> {
        self.enter()?;
        self.receive_count.fetch_add(1, Ordering::SeqCst);

        if let Some(vm_status) = lock(&self.rejection).clone() {
            return Ok(self.aborted(vm_status));
        }

        let header = MessageHeader::decode(message)?;
        if lock(&self.used_nonces).contains(&(header.source_domain, header.nonce)) {
            return Ok(self.aborted("Move abort: ENONCE_ALREADY_USED".to_string()));
        }

        let body = header.burn_body()?;
        let (source_decimals, destination_decimals) = *lock(&self.decimals);
        let amount = rescale(body.amount, source_decimals, destination_decimals)?;
        lock(&self.used_nonces).insert((header.source_domain, header.nonce));

        let recipient = DestinationAddress(body.mint_recipient);
        *lock(&self.balances).entry(recipient).or_insert(0) += amount;

        let tx_id = self.next_tx_id();
        let sequence = lock(&self.received).len() as u64;
        lock(&self.received).push((
            recipient,
            ReceiveEvent {
                tx_id: tx_id.clone(),
                source_domain: header.source_domain,
                nonce: header.nonce,
                amount,
                timestamp: Some(1_700_000_000 + sequence),
            },
        ));

        Ok(DestinationTx {
            tx_id,
            success: true,
            vm_status: EXECUTED.to_string(),
        })
    }

    async fn is_nonce_used(&self, source_domain: DomainId, nonce: u64) -> Result<bool> {
        self.enter()?;
        Ok(lock(&self.used_nonces).contains(&(source_domain, nonce)))
    }

    async fn account_exists(&self, _address: &DestinationAddress) -> Result<bool> {
        self.enter()?;
        Ok(true)
    }

    async fn receive_events(
        &self,
        address: &DestinationAddress,
        limit: usize,
    ) -> Result<Vec<ReceiveEvent>> {
        self.enter()?;
        Ok(lock(&self.received)
            .iter()
            .rev()
            .filter(|(recipient, _)| recipient == address)
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect())
    }
}
