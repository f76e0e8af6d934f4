//! Transfer orchestrator
//!
//! Drives burn → attestation → mint strictly in sequence, carries each stage's
//! outcome into the next, and always returns a [`TransferResult`] with whatever
//! stages were reached. The orchestrator never retries a whole attempt; that
//! decision belongs to the caller (see [`TransferOrchestrator::resume`] for
//! continuing after a final burn).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::amount::{format_minor_units, rescale, to_minor_units};
use crate::attestation::{
    AttestationApi, AttestationPoller, AttestationRecord, AttestationStatus, PollTarget,
};
use crate::burn::{BurnClient, TransferReceipt};
use crate::config::Config;
use crate::error::TransferError;
use crate::ledger::{DestinationLedger, SourceLedger};
use crate::mint::{MintClient, MintOutcome};
use crate::progress::{report, ProgressEvent, ProgressSink};
use crate::redact::SecretKey;
use crate::stage::{AttestationStage, BurnStage, MintStage};
use crate::state::{PhaseMachine, TransferPhase};
use crate::types::{DestinationAddress, DomainId};

/// One transfer attempt's input
#[derive(Clone)]
pub struct TransferRequest {
    /// Decimal amount, e.g. `"1.5"`
    pub amount: String,
    pub source_credential: SecretKey,
    /// Destination account, `0x` + 64 hex characters
    pub recipient: String,
    pub destination_credential: SecretKey,
    /// End-to-end bound on the attestation wait, measured from the start
    pub deadline: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl TransferRequest {
    pub fn new(
        amount: impl Into<String>,
        source_credential: SecretKey,
        recipient: impl Into<String>,
        destination_credential: SecretKey,
    ) -> Self {
        Self {
            amount: amount.into(),
            source_credential,
            recipient: recipient.into(),
            destination_credential,
            deadline: None,
            progress: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("amount", &self.amount)
            .field("source_credential", &self.source_credential)
            .field("recipient", &self.recipient)
            .field("destination_credential", &self.destination_credential)
            .field("deadline", &self.deadline)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Continue a transfer whose burn is already final
#[derive(Clone)]
pub struct ResumeRequest {
    pub source_tx_id: String,
    pub destination_credential: SecretKey,
    pub deadline: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl ResumeRequest {
    pub fn new(source_tx_id: impl Into<String>, destination_credential: SecretKey) -> Self {
        Self {
            source_tx_id: source_tx_id.into(),
            destination_credential,
            deadline: None,
            progress: None,
        }
    }
}

impl fmt::Debug for ResumeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeRequest")
            .field("source_tx_id", &self.source_tx_id)
            .field("destination_credential", &self.destination_credential)
            .field("deadline", &self.deadline)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Audit trail of the stages an attempt reached.
///
/// Entries are written once, in stage order, and never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepLedger {
    burn: Option<TransferReceipt>,
    attestation: Option<AttestationRecord>,
    mint: Option<MintOutcome>,
}

impl StepLedger {
    pub fn burn(&self) -> Option<&TransferReceipt> {
        self.burn.as_ref()
    }

    pub fn attestation(&self) -> Option<&AttestationRecord> {
        self.attestation.as_ref()
    }

    pub fn mint(&self) -> Option<&MintOutcome> {
        self.mint.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.burn.is_none() && self.attestation.is_none() && self.mint.is_none()
    }

    /// All three stages present
    pub fn is_complete(&self) -> bool {
        self.burn.is_some() && self.attestation.is_some() && self.mint.is_some()
    }

    fn record_burn(&mut self, receipt: TransferReceipt) -> Result<(), TransferError> {
        if self.burn.is_some() {
            return Err(TransferError::InvalidStateTransition {
                from: "burn recorded",
                to: "burn recorded",
            });
        }
        self.burn = Some(receipt);
        Ok(())
    }

    fn record_attestation(&mut self, record: AttestationRecord) -> Result<(), TransferError> {
        if self.burn.is_none() || self.attestation.is_some() {
            return Err(TransferError::InvalidStateTransition {
                from: "burn missing or attestation recorded",
                to: "attestation recorded",
            });
        }
        self.attestation = Some(record);
        Ok(())
    }

    fn record_mint(&mut self, outcome: MintOutcome) -> Result<(), TransferError> {
        if self.attestation.is_none() || self.mint.is_some() {
            return Err(TransferError::InvalidStateTransition {
                from: "attestation missing or mint recorded",
                to: "mint recorded",
            });
        }
        self.mint = Some(outcome);
        Ok(())
    }
}

/// Outcome of one attempt, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub success: bool,
    pub phase: TransferPhase,
    pub source_tx_id: Option<String>,
    pub dest_tx_id: Option<String>,
    /// Minted amount in destination minor units
    pub final_amount: Option<u128>,
    /// `final_amount` as a decimal string
    pub final_amount_formatted: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    #[serde(skip)]
    pub failure: Option<TransferError>,
    pub steps: StepLedger,
}

/// Timing bounds derived from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEstimate {
    pub poll_interval_ms: u64,
    pub attestation_max_wait_ms: u64,
    pub max_polls: u32,
    pub submission_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Longest the pipeline can spend outside ledger confirmations
    pub worst_case_wait_ms: u64,
}

/// A message previously received on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferHistoryEntry {
    pub dest_tx_id: String,
    pub source_domain: DomainId,
    pub nonce: u64,
    pub amount: u128,
    pub amount_formatted: String,
    pub timestamp: Option<u64>,
}

/// Mutable state of one running attempt
struct Attempt {
    machine: PhaseMachine,
    steps: StepLedger,
    sink: Option<Arc<dyn ProgressSink>>,
    deadline: Option<Instant>,
}

impl Attempt {
    fn start(sink: Option<Arc<dyn ProgressSink>>, deadline: Option<Duration>) -> Self {
        Self {
            machine: PhaseMachine::default(),
            steps: StepLedger::default(),
            sink,
            deadline: deadline.map(|d| Instant::now() + d),
        }
    }

    fn report(&self, event: ProgressEvent) {
        report(self.sink.as_deref(), event);
    }

    fn advance(&mut self, next: TransferPhase) -> Result<(), TransferError> {
        self.machine.advance(next)?;
        info!(phase = %next, "Transfer phase");
        Ok(())
    }
}

/// Sequences the three transfer stages
pub struct TransferOrchestrator {
    burn: Arc<dyn BurnStage>,
    attestation: Arc<dyn AttestationStage>,
    mint: Arc<dyn MintStage>,
    source: Arc<dyn SourceLedger>,
    destination: Arc<dyn DestinationLedger>,
    config: Config,
}

impl TransferOrchestrator {
    /// Orchestrator over explicit stage implementations
    pub fn new(
        burn: Arc<dyn BurnStage>,
        attestation: Arc<dyn AttestationStage>,
        mint: Arc<dyn MintStage>,
        source: Arc<dyn SourceLedger>,
        destination: Arc<dyn DestinationLedger>,
        config: Config,
    ) -> Self {
        Self {
            burn,
            attestation,
            mint,
            source,
            destination,
            config,
        }
    }

    /// Orchestrator with the standard burn, poll, and mint clients
    pub fn from_collaborators(
        source: Arc<dyn SourceLedger>,
        destination: Arc<dyn DestinationLedger>,
        api: Arc<dyn AttestationApi>,
        config: Config,
    ) -> Self {
        let burn = Arc::new(BurnClient::new(
            source.clone(),
            &config.source,
            config.destination.domain,
            config.retry.clone(),
        ));
        let poller = Arc::new(AttestationPoller::new(
            api,
            source.clone(),
            config.attestation.clone(),
        ));
        let mint = Arc::new(MintClient::new(destination.clone()));
        Self::new(burn, poller, mint, source, destination, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run burn → attestation → mint for `request`
    pub async fn transfer(&self, request: TransferRequest) -> TransferResult {
        let mut attempt = Attempt::start(request.progress.clone(), request.deadline);
        attempt.report(ProgressEvent::TransferStarted {
            amount: request.amount.clone(),
            recipient: request.recipient.clone(),
        });
        info!(
            amount = %request.amount,
            recipient = %request.recipient,
            source = %self.config.source.name,
            destination = %self.config.destination.name,
            "Starting transfer"
        );

        let outcome = self.run_transfer(&request, &mut attempt).await;
        self.finish(attempt, outcome)
    }

    /// Attest and mint for a burn that is already final on the source chain
    pub async fn resume(&self, request: ResumeRequest) -> TransferResult {
        let mut attempt = Attempt::start(request.progress.clone(), request.deadline);
        info!(source_tx = %request.source_tx_id, "Resuming transfer");

        let outcome = self.run_resume(&request, &mut attempt).await;
        self.finish(attempt, outcome)
    }

    async fn run_transfer(
        &self,
        request: &TransferRequest,
        attempt: &mut Attempt,
    ) -> Result<(), TransferError> {
        self.validate(request)?;

        attempt.advance(TransferPhase::Burning)?;
        attempt.report(ProgressEvent::BurnSubmitted);
        let receipt = self
            .burn
            .burn(&request.amount, &request.recipient, &request.source_credential)
            .await?;
        attempt.steps.record_burn(receipt.clone())?;
        attempt.report(ProgressEvent::BurnConfirmed {
            source_tx_id: receipt.source_tx_id.clone(),
        });

        self.attest_and_mint(&receipt, &request.destination_credential, attempt)
            .await
    }

    async fn run_resume(
        &self,
        request: &ResumeRequest,
        attempt: &mut Attempt,
    ) -> Result<(), TransferError> {
        if !request.destination_credential.is_well_formed() {
            return Err(TransferError::InvalidCredential(
                "destination key must be 0x followed by 64 hex characters".to_string(),
            ));
        }

        let receipt = self.burn.recover(&request.source_tx_id).await?;
        attempt.steps.record_burn(receipt.clone())?;
        attempt.report(ProgressEvent::BurnConfirmed {
            source_tx_id: receipt.source_tx_id.clone(),
        });

        self.attest_and_mint(&receipt, &request.destination_credential, attempt)
            .await
    }

    async fn attest_and_mint(
        &self,
        receipt: &TransferReceipt,
        credential: &SecretKey,
        attempt: &mut Attempt,
    ) -> Result<(), TransferError> {
        attempt.advance(TransferPhase::Attesting)?;
        attempt.report(ProgressEvent::AttestationRequested {
            message_hash: receipt.message_hash,
        });

        let target = PollTarget {
            source_tx_id: receipt.source_tx_id.clone(),
            message: receipt.message.clone(),
            message_hash: receipt.message_hash,
        };
        let record = self
            .attestation
            .await_attestation(&target, attempt.deadline)
            .await?;
        attempt.steps.record_attestation(record.clone())?;
        attempt.report(ProgressEvent::AttestationReceived {
            message_hash: record.message_hash,
            status: record.status,
        });

        match record.status {
            AttestationStatus::Complete => {}
            AttestationStatus::Failed => {
                return Err(TransferError::AttestationFailed {
                    message_hash: record.message_hash.to_hex(),
                })
            }
            AttestationStatus::Pending => {
                return Err(TransferError::InvalidStateTransition {
                    from: "pending",
                    to: "MINTING",
                })
            }
        }
        if !record.is_valid() {
            return Err(TransferError::InvalidAttestationInput(
                "attestation record is missing message or signature bytes".to_string(),
            ));
        }

        attempt.advance(TransferPhase::Minting)?;
        attempt.report(ProgressEvent::MintSubmitted);
        let outcome = self
            .mint
            .mint(&record.message, &record.attestation, credential)
            .await?;
        let success = outcome.success;
        let dest_tx_id = outcome.dest_tx_id.clone();
        let minted_amount = outcome.minted_amount;
        let vm_status = outcome.vm_status.clone();
        attempt.steps.record_mint(outcome)?;
        if !success {
            return Err(TransferError::TransactionFailed(vm_status));
        }
        if let Some(expected) = self.unexpected_mint_amount(receipt, minted_amount) {
            warn!(
                dest_tx = %dest_tx_id,
                expected,
                minted_amount,
                "Minted amount differs from the burned amount"
            );
        }
        attempt.report(ProgressEvent::MintConfirmed {
            dest_tx_id,
            minted_amount,
        });

        attempt.advance(TransferPhase::Done)
    }

    /// Burned amount in destination units when the minted delta disagrees with it
    fn unexpected_mint_amount(&self, receipt: &TransferReceipt, minted_amount: u128) -> Option<u128> {
        let burned = receipt.amount?;
        let source = self.config.source.decimals;
        let destination = self.config.destination.decimals;
        match rescale(burned, source, destination) {
            Ok(expected) if expected == minted_amount => None,
            Ok(expected) => Some(expected),
            Err(e) => {
                warn!(burned, error = %e, "Burned amount not representable on destination");
                None
            }
        }
    }

    fn validate(&self, request: &TransferRequest) -> Result<(), TransferError> {
        DestinationAddress::parse(&request.recipient)?;
        if !request.source_credential.is_well_formed() {
            return Err(TransferError::InvalidCredential(
                "source key must be 0x followed by 64 hex characters".to_string(),
            ));
        }
        if !request.destination_credential.is_well_formed() {
            return Err(TransferError::InvalidCredential(
                "destination key must be 0x followed by 64 hex characters".to_string(),
            ));
        }
        to_minor_units(&request.amount, self.config.source.decimals)?;
        Ok(())
    }

    fn finish(&self, mut attempt: Attempt, outcome: Result<(), TransferError>) -> TransferResult {
        let outcome = outcome.and_then(|()| {
            let minted = attempt.steps.mint().map(|m| m.success).unwrap_or(false);
            if attempt.machine.phase() == TransferPhase::Done
                && attempt.steps.is_complete()
                && minted
            {
                Ok(())
            } else {
                Err(TransferError::InvalidStateTransition {
                    from: attempt.machine.phase().as_str(),
                    to: TransferPhase::Done.as_str(),
                })
            }
        });

        let source_tx_id = attempt.steps.burn().map(|b| b.source_tx_id.clone());
        let dest_tx_id = attempt.steps.mint().map(|m| m.dest_tx_id.clone());
        let decimals = self.config.destination.decimals;

        match outcome {
            Ok(()) => {
                let final_amount = attempt.steps.mint().map(|m| m.minted_amount);
                attempt.report(ProgressEvent::TransferCompleted);
                info!(
                    source_tx = ?source_tx_id,
                    dest_tx = ?dest_tx_id,
                    final_amount = ?final_amount,
                    "Transfer completed"
                );
                TransferResult {
                    success: true,
                    phase: TransferPhase::Done,
                    source_tx_id,
                    dest_tx_id,
                    final_amount,
                    final_amount_formatted: final_amount.map(|a| format_minor_units(a, decimals)),
                    error: None,
                    error_code: None,
                    failure: None,
                    steps: attempt.steps,
                }
            }
            Err(err) => {
                if !attempt.machine.phase().is_terminal() {
                    // Always legal from a non-terminal phase.
                    let _ = attempt.machine.advance(TransferPhase::Failed);
                }
                let failed_phase = attempt.machine.phase();
                if err.is_validation() {
                    warn!(code = err.code(), error = %err, "Transfer rejected");
                } else {
                    error!(
                        code = err.code(),
                        error = %err,
                        source_tx = ?source_tx_id,
                        dest_tx = ?dest_tx_id,
                        "Transfer failed"
                    );
                }
                attempt.report(ProgressEvent::TransferFailed {
                    code: err.code(),
                    error: err.to_string(),
                });
                TransferResult {
                    success: false,
                    phase: failed_phase,
                    source_tx_id,
                    dest_tx_id,
                    final_amount: None,
                    final_amount_formatted: None,
                    error: Some(err.to_string()),
                    error_code: Some(err.code()),
                    failure: Some(err),
                    steps: attempt.steps,
                }
            }
        }
    }

    /// Advisory pre-flight checks; returns human-readable issues.
    ///
    /// Never submits anything. Callers may ignore the result and transfer anyway.
    pub async fn check_prerequisites(&self, request: &TransferRequest) -> Vec<String> {
        let mut issues = Vec::new();

        let recipient = match DestinationAddress::parse(&request.recipient) {
            Ok(addr) => Some(addr),
            Err(e) => {
                issues.push(e.to_string());
                None
            }
        };

        let source_key_ok = request.source_credential.is_well_formed();
        if !source_key_ok {
            issues.push("Source private key must be 0x followed by 64 hex characters".to_string());
        }
        let dest_key_ok = request.destination_credential.is_well_formed();
        if !dest_key_ok {
            issues.push(
                "Destination private key must be 0x followed by 64 hex characters".to_string(),
            );
        }

        let decimals = self.config.source.decimals;
        let amount = match to_minor_units(&request.amount, decimals) {
            Ok(raw) => Some(raw),
            Err(e) => {
                issues.push(e.to_string());
                None
            }
        };

        match self.source.block_number().await {
            Ok(block) => {
                info!(chain = %self.config.source.name, block, "Source chain reachable");
                if source_key_ok {
                    match self.source.account_nonce(&request.source_credential).await {
                        Ok(nonce) => debug!(nonce, "Source account sequence"),
                        Err(e) => issues.push(format!("Could not query source account nonce: {:#}", e)),
                    }
                }
                if let (true, Some(required)) = (source_key_ok, amount) {
                    match self.source.token_balance(&request.source_credential).await {
                        Ok(balance) if balance < required => issues.push(format!(
                            "Insufficient balance: required {}, available {}",
                            format_minor_units(required, decimals),
                            format_minor_units(balance, decimals)
                        )),
                        Ok(_) => {}
                        Err(e) => issues.push(format!("Could not query source balance: {:#}", e)),
                    }
                }
            }
            Err(e) => issues.push(format!(
                "{} is not reachable: {:#}",
                self.config.source.name, e
            )),
        }

        if dest_key_ok {
            match self
                .destination
                .account_address(&request.destination_credential)
                .await
            {
                Ok(signer) => {
                    match self.destination.account_exists(&signer).await {
                        Ok(true) => {}
                        Ok(false) => issues.push(format!(
                            "Destination account {} does not exist on {}",
                            signer, self.config.destination.name
                        )),
                        Err(e) => issues.push(format!(
                            "{} is not reachable: {:#}",
                            self.config.destination.name, e
                        )),
                    }
                    if let Some(recipient) = recipient.filter(|r| *r != signer) {
                        if let Ok(false) = self.destination.is_asset_registered(&recipient).await {
                            issues.push(format!(
                                "Recipient {} cannot hold USDC yet and differs from the destination signer",
                                recipient
                            ));
                        }
                    }
                }
                Err(e) => issues.push(format!(
                    "{} is not reachable: {:#}",
                    self.config.destination.name, e
                )),
            }
        }

        if !issues.is_empty() {
            warn!(count = issues.len(), "Pre-flight check found issues");
        }
        issues
    }

    /// Timing bounds implied by the configuration
    pub fn estimate(&self) -> TransferEstimate {
        let attestation = &self.config.attestation;
        let retry = &self.config.retry;

        let poll_bound = attestation
            .poll_interval_ms
            .saturating_mul(attestation.max_polls as u64);
        let attestation_wait = poll_bound.min(attestation.max_wait_ms);
        // Approval and burn each back off at most (attempts - 1) times.
        let submission_wait = retry
            .backoff_ms
            .saturating_mul(retry.max_attempts.saturating_sub(1) as u64)
            .saturating_mul(2);

        TransferEstimate {
            poll_interval_ms: attestation.poll_interval_ms,
            attestation_max_wait_ms: attestation.max_wait_ms,
            max_polls: attestation.max_polls,
            submission_attempts: retry.max_attempts,
            retry_backoff_ms: retry.backoff_ms,
            worst_case_wait_ms: attestation_wait.saturating_add(submission_wait),
        }
    }

    /// Recent messages received by `address`, newest first.
    ///
    /// Lookup failures degrade to an empty list.
    pub async fn transfer_history(&self, address: &str, limit: usize) -> Vec<TransferHistoryEntry> {
        let address = match DestinationAddress::parse(address) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "Invalid address for transfer history");
                return Vec::new();
            }
        };

        let decimals = self.config.destination.decimals;
        match self.destination.receive_events(&address, limit).await {
            Ok(events) => events
                .into_iter()
                .take(limit)
                .map(|event| TransferHistoryEntry {
                    dest_tx_id: event.tx_id,
                    source_domain: event.source_domain,
                    nonce: event.nonce,
                    amount: event.amount,
                    amount_formatted: format_minor_units(event.amount, decimals),
                    timestamp: event.timestamp,
                })
                .collect(),
            Err(e) => {
                warn!(address = %address, error = %format!("{:#}", e), "Failed to load transfer history");
                Vec::new()
            }
        }
    }
}
