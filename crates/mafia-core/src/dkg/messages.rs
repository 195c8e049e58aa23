//! DKG message types

use crate::fhe::{KeySwitchMaterial, KeyTag, MultKeyShare, PublicKey};
use crate::GameId;
use serde::{Deserialize, Serialize};

/// Lead: generate the first keypair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadKeyRequest {
    pub game_id: GameId,
}

/// Joiner: extend the previous party's public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinKeyRequest {
    pub game_id: GameId,
    /// Running public key output by the previous party
    pub previous_public_key: PublicKey,
}

/// Broadcast of the final joint public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallJointKeyRequest {
    pub game_id: GameId,
    pub joint_public_key: PublicKey,
}

/// Round A
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMultKeyRequest {
    pub game_id: GameId,
}

/// Round B: `previous` is `None` for the lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySwitchRequest {
    pub game_id: GameId,
    pub previous: Option<KeySwitchMaterial>,
}

/// Round C
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultKeyRequest {
    pub game_id: GameId,
    /// Final output of the round B chain
    pub combined: KeySwitchMaterial,
    pub key_tag: KeyTag,
}

/// Every party's round C contribution, including the receiver's own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeMultKeysRequest {
    pub game_id: GameId,
    pub contributions: Vec<MultKeyShare>,
}

/// Outcome of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Contributions from other parties taken in
    pub inserted: usize,
    /// Contributions already held (own fragment, or a repeated merge)
    pub skipped: usize,
}
