//! Transfer phase machine
//!
//! `INIT -> BURNING -> ATTESTING -> MINTING -> {DONE | FAILED}`
//!
//! A resumed transfer enters at `ATTESTING` because its burn is already final.
//! Any non-terminal phase may fall to `FAILED`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransferError;

/// Phase of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferPhase {
    Init,
    Burning,
    Attesting,
    Minting,
    /// Terminal: all three stages succeeded
    Done,
    /// Terminal: a stage failed or validation rejected the request
    Failed,
}

impl TransferPhase {
    /// Check if this is a terminal phase (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Done | TransferPhase::Failed)
    }

    /// Whether `next` may follow this phase
    pub fn can_transition_to(&self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        match (self, next) {
            (Init, Burning) | (Init, Attesting) => true,
            (Burning, Attesting) => true,
            (Attesting, Minting) => true,
            (Minting, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Get human-readable phase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Init => "INIT",
            TransferPhase::Burning => "BURNING",
            TransferPhase::Attesting => "ATTESTING",
            TransferPhase::Minting => "MINTING",
            TransferPhase::Done => "DONE",
            TransferPhase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the current phase and rejects out-of-order moves
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: TransferPhase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            phase: TransferPhase::Init,
        }
    }
}

impl PhaseMachine {
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn advance(&mut self, next: TransferPhase) -> Result<(), TransferError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransferError::InvalidStateTransition {
                from: self.phase.as_str(),
                to: next.as_str(),
            });
        }
        self.phase = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(TransferPhase::Done.is_terminal());
        assert!(TransferPhase::Failed.is_terminal());
        assert!(!TransferPhase::Init.is_terminal());
        assert!(!TransferPhase::Attesting.is_terminal());
    }

    #[test]
    fn test_forward_path() {
        let mut machine = PhaseMachine::default();
        for next in [
            TransferPhase::Burning,
            TransferPhase::Attesting,
            TransferPhase::Minting,
            TransferPhase::Done,
        ] {
            machine.advance(next).unwrap();
        }
        assert_eq!(machine.phase(), TransferPhase::Done);
    }

    #[test]
    fn test_no_skipping_attestation() {
        let mut machine = PhaseMachine::default();
        machine.advance(TransferPhase::Burning).unwrap();
        let err = machine.advance(TransferPhase::Minting).unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidStateTransition {
                from: "BURNING",
                to: "MINTING"
            }
        );
        assert_eq!(machine.phase(), TransferPhase::Burning);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut machine = PhaseMachine::default();
        machine.advance(TransferPhase::Failed).unwrap();
        assert!(machine.advance(TransferPhase::Failed).is_err());
        assert!(machine.advance(TransferPhase::Burning).is_err());
    }

    #[test]
    fn test_resume_enters_at_attesting() {
        assert!(TransferPhase::Init.can_transition_to(TransferPhase::Attesting));
        assert!(!TransferPhase::Init.can_transition_to(TransferPhase::Minting));
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferPhase::Attesting.to_string(), "ATTESTING");
    }
}
