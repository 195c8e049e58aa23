//! Protocol timing and decoding parameters

use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables shared by every protocol step of a party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Overall bound on one relay chain, requester side
    pub relay_timeout_ms: u64,
    /// Bound on each investigation share request
    pub investigate_timeout_ms: u64,
    /// Bound on each decoy request
    pub decoy_timeout_ms: u64,
    /// Lower bound of the citizen submission delay
    pub citizen_delay_min_ms: u64,
    /// Upper bound of the citizen submission delay
    pub citizen_delay_max_ms: u64,
    /// Largest plaintext value fusion will decode
    pub decode_bound: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            relay_timeout_ms: 60_000,
            investigate_timeout_ms: 10_000,
            decoy_timeout_ms: 5_000,
            citizen_delay_min_ms: 1_000,
            citizen_delay_max_ms: 2_500,
            decode_bound: 1_024,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.citizen_delay_min_ms > self.citizen_delay_max_ms {
            return Err(Error::InvalidConfig(
                "citizen delay minimum exceeds maximum".into(),
            ));
        }
        if self.decode_bound == 0 {
            return Err(Error::InvalidConfig("decode bound must be positive".into()));
        }
        if self.relay_timeout_ms == 0
            || self.investigate_timeout_ms == 0
            || self.decoy_timeout_ms == 0
        {
            return Err(Error::InvalidConfig("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn investigate_timeout(&self) -> Duration {
        Duration::from_millis(self.investigate_timeout_ms)
    }

    pub fn decoy_timeout(&self) -> Duration {
        Duration::from_millis(self.decoy_timeout_ms)
    }

    /// Random delay a citizen waits before submitting its dummy triple
    pub fn citizen_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let ms = rng.gen_range(self.citizen_delay_min_ms..=self.citizen_delay_max_ms);
        Duration::from_millis(ms)
    }
}
