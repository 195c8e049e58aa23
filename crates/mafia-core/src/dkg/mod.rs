//! Distributed Key Generation
//!
//! Chained key generation in join order, followed by the three-round
//! multiplication key setup. Party-side handlers live in [`engine`]; the
//! driver that walks every party through the rounds is
//! [`crate::host::DkgCoordinator`].
//!
//! ## Round order
//!
//! ```text
//! lead key -> join keys -> install joint key
//!          -> (A) eval mult key -> (B) key switch chain
//!          -> (C) mult key -> merge
//! ```
//!
//! Every handler checks the game identifier and the current phase; a round
//! arriving out of order is a [`crate::Error::ProtocolSequence`].

mod engine;
mod messages;

pub use messages::*;

#[cfg(test)]
pub(crate) use engine::setup_sessions;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Setup progress of one party
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DkgPhase {
    AwaitingKey,
    KeyGenerated,
    JointKeyInstalled,
    EvalKeyGenerated,
    KeySwitchGenerated,
    MultKeyGenerated,
    Complete,
}

/// DKG state machine
#[derive(Debug, Clone, Default)]
pub struct DkgState {
    phase: DkgPhase,
}

impl Default for DkgPhase {
    fn default() -> Self {
        DkgPhase::AwaitingKey
    }
}

impl DkgState {
    pub fn phase(&self) -> DkgPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == DkgPhase::Complete
    }

    /// Fail unless the machine sits exactly at `expected`
    pub(crate) fn expect(&self, expected: DkgPhase, round: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::ProtocolSequence(format!(
                "{} requires phase {:?}, party is at {:?}",
                round, expected, self.phase
            )));
        }
        Ok(())
    }

    /// Move `from -> to`, rejecting any other starting phase
    pub(crate) fn advance(&mut self, from: DkgPhase, to: DkgPhase, round: &str) -> Result<()> {
        self.expect(from, round)?;
        self.phase = to;
        Ok(())
    }
}
