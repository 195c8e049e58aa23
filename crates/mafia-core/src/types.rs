//! Core types shared across the protocol

use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index of a party in join order
pub type PartyId = usize;

/// Game session identifier
pub type GameId = String;

/// Party that generates the first DKG keypair
pub const LEAD_PARTY: PartyId = 0;

/// Number of role kinds, the length of every role vector
pub const ROLE_KINDS: usize = 4;

/// Secret role of a party
///
/// The discriminant is the one-hot coordinate used in role vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen = 0,
    Mafia = 1,
    Doctor = 2,
    Police = 3,
}

impl Role {
    pub const ALL: [Role; ROLE_KINDS] = [Role::Citizen, Role::Mafia, Role::Doctor, Role::Police];

    /// One-hot coordinate of this role
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Role> {
        Role::ALL
            .get(index)
            .copied()
            .ok_or_else(|| Error::Crypto(format!("no role at coordinate {}", index)))
    }

    /// Target this role writes into the attack vector, if any
    pub fn attack_target(self, decision: Option<PartyId>) -> Option<PartyId> {
        match self {
            Role::Mafia => decision,
            _ => None,
        }
    }

    /// Target this role writes into the heal vector, if any
    pub fn heal_target(self, decision: Option<PartyId>) -> Option<PartyId> {
        match self {
            Role::Doctor => decision,
            _ => None,
        }
    }

    /// Whether the night decision triggers an out-of-band investigation
    pub fn investigates(self) -> bool {
        matches!(self, Role::Police)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Citizen => "citizen",
            Role::Mafia => "mafia",
            Role::Doctor => "doctor",
            Role::Police => "police",
        };
        f.write_str(label)
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown role: {}", s)))
    }
}

/// Role assignment for every seat, in party order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster(Vec<Role>);

impl Roster {
    /// Explicit roster
    pub fn new(roles: Vec<Role>) -> Result<Self> {
        if roles.is_empty() {
            return Err(Error::InvalidConfig("roster cannot be empty".into()));
        }
        Ok(Self(roles))
    }

    /// One mafia per four seats (at least one), one doctor, one police,
    /// citizens for the rest, shuffled
    pub fn standard<R: RngCore + CryptoRng>(n_parties: usize, rng: &mut R) -> Result<Self> {
        if n_parties < 3 {
            return Err(Error::InvalidConfig(format!(
                "standard roster needs at least 3 parties, got {}",
                n_parties
            )));
        }

        let mafia = (n_parties / 4).max(1);
        let mut roles = vec![Role::Mafia; mafia];
        roles.push(Role::Doctor);
        roles.push(Role::Police);
        roles.resize(n_parties, Role::Citizen);
        roles.shuffle(rng);

        Ok(Self(roles))
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
