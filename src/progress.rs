//! Progress events for observers of a transfer
//!
//! Sinks are observational only. A sink that panics or drops events has no
//! effect on the pipeline; each event is also logged at `info`.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::attestation::AttestationStatus;
use crate::types::MessageHash;

/// Named milestone of a transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TransferStarted { amount: String, recipient: String },
    BurnSubmitted,
    BurnConfirmed { source_tx_id: String },
    AttestationRequested { message_hash: Option<MessageHash> },
    AttestationReceived { message_hash: MessageHash, status: AttestationStatus },
    MintSubmitted,
    MintConfirmed { dest_tx_id: String, minted_amount: u128 },
    TransferCompleted,
    TransferFailed { code: &'static str, error: String },
}

impl ProgressEvent {
    /// Human-readable label
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::TransferStarted { .. } => "transfer started",
            ProgressEvent::BurnSubmitted => "burn submitted",
            ProgressEvent::BurnConfirmed { .. } => "burn confirmed",
            ProgressEvent::AttestationRequested { .. } => "attestation requested",
            ProgressEvent::AttestationReceived { .. } => "attestation received",
            ProgressEvent::MintSubmitted => "mint submitted",
            ProgressEvent::MintConfirmed { .. } => "mint confirmed",
            ProgressEvent::TransferCompleted => "transfer completed",
            ProgressEvent::TransferFailed { .. } => "transfer failed",
        }
    }
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink(pub UnboundedSender<ProgressEvent>);

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        // Receiver gone means nobody is watching.
        let _ = self.0.send(event.clone());
    }
}

/// Log `event` and forward it to `sink`, shielding the caller from sink panics
pub(crate) fn report(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    info!(progress = event.name(), event = ?event, "Transfer progress");
    if let Some(sink) = sink {
        let delivered =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.emit(&event)));
        if delivered.is_err() {
            tracing::warn!(progress = event.name(), "Progress sink panicked; ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &ProgressEvent| seen.lock().unwrap().push(event.name());
        report(Some(&sink), ProgressEvent::BurnSubmitted);
        report(Some(&sink), ProgressEvent::TransferCompleted);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["burn submitted", "transfer completed"]
        );
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink(tx);
        report(Some(&sink), ProgressEvent::MintSubmitted);
        assert_eq!(rx.recv().await, Some(ProgressEvent::MintSubmitted));

        drop(rx);
        report(Some(&sink), ProgressEvent::TransferCompleted);
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink = |_: &ProgressEvent| panic!("observer bug");
        report(Some(&sink), ProgressEvent::BurnSubmitted);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ProgressEvent::BurnConfirmed {
            source_tx_id: "0xabc".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "burn_confirmed");
        assert_eq!(json["source_tx_id"], "0xabc");
    }
}
