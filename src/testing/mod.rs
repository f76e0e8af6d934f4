//! In-memory collaborators for tests and dry runs
//!
//! Each mock counts its calls and can be scripted to fail, so tests can assert
//! both outcomes and which ledger calls were (or were not) made.

mod attestation;
mod destination;
mod source;

pub use attestation::MockAttestationApi;
pub use destination::MockDestinationLedger;
pub use source::MockSourceLedger;

use std::sync::{Mutex, MutexGuard};

use crate::progress::{ProgressEvent, ProgressSink};

/// Well-formed private key accepted by every mock
pub const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Well-formed destination account; also the mock destination signer in most tests
pub const TEST_RECIPIENT: &str =
    "0x9e2b5f1c0d8a7e6f4b3c2a1908f7e6d5c4b3a2918f7e6d5c4b3a29180f1e2d3c";

/// 65-byte signature placeholder returned by [`MockAttestationApi::attest_everything`]
pub const TEST_ATTESTATION: [u8; 65] = [0xaa; 65];

/// Records every progress event it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(ProgressEvent::name).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: &ProgressEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Mock state stays usable after a panicking test thread
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
