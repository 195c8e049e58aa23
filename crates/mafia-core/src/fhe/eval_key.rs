//! Joint multiplication-key material
//!
//! The joint key is `s·PK = s²·G`, where `s` is the (never reconstructed)
//! sum of all secret shares. It is built in three ordered rounds:
//!
//! 1. every party publishes `x_i·G` under its own secret,
//! 2. the key-switch chain accumulates those into `s·G`,
//! 3. every party lifts the combined material with its own secret,
//!    `x_i·(s·G)`, and the contributions are summed.

use super::{b64, KeyTag, SecretKeyShare};
use crate::{Error, PartyId, Result};
use k256::ProjectivePoint;
use serde::{Deserialize, Serialize};

/// Rounds A and B output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySwitchMaterial {
    /// Joint key this material belongs to
    pub tag: KeyTag,
    #[serde(with = "b64::point")]
    pub(crate) point: ProjectivePoint,
}

/// Round C output of one party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultKeyShare {
    pub party: PartyId,
    pub tag: KeyTag,
    #[serde(with = "b64::point")]
    pub(crate) point: ProjectivePoint,
}

/// Merged joint multiplication key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointMultKey {
    pub tag: KeyTag,
    #[serde(with = "b64::point")]
    pub(crate) point: ProjectivePoint,
}

impl JointMultKey {
    /// Short digest for log correlation
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&super::encode_point(&self.point)).as_bytes()[..6])
    }
}

fn check_tag(expected: &KeyTag, actual: &KeyTag) -> Result<()> {
    if expected != actual {
        return Err(Error::ProtocolSequence(format!(
            "key tag mismatch: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Round A: local evaluation material under this party's secret
pub fn eval_mult_keygen(secret: &SecretKeyShare, tag: KeyTag) -> KeySwitchMaterial {
    KeySwitchMaterial {
        tag,
        point: ProjectivePoint::GENERATOR * secret.scalar(),
    }
}

/// Round B: fold this party's secret into the running key-switch material
///
/// The lead starts the chain (`previous == None`) from its own round-A
/// material.
pub fn multi_key_switch_gen(
    secret: &SecretKeyShare,
    own: &KeySwitchMaterial,
    previous: Option<&KeySwitchMaterial>,
) -> Result<KeySwitchMaterial> {
    let point = match previous {
        None => own.point,
        Some(prev) => {
            check_tag(&own.tag, &prev.tag)?;
            prev.point + ProjectivePoint::GENERATOR * secret.scalar()
        }
    };
    Ok(KeySwitchMaterial {
        tag: own.tag.clone(),
        point,
    })
}

/// Round C: lift the fully combined material with this party's secret
pub fn multi_mult_eval_key(
    secret: &SecretKeyShare,
    party: PartyId,
    combined: &KeySwitchMaterial,
    tag: &KeyTag,
) -> Result<MultKeyShare> {
    check_tag(tag, &combined.tag)?;
    Ok(MultKeyShare {
        party,
        tag: tag.clone(),
        point: combined.point * secret.scalar(),
    })
}

/// Sum one contribution per party into the joint key
pub fn merge_mult_keys(contributions: &[MultKeyShare], n_parties: usize) -> Result<JointMultKey> {
    let first = contributions
        .first()
        .ok_or_else(|| Error::InvalidShares("no multiplication key contributions".into()))?;

    let mut seen = vec![false; n_parties];
    let mut point = ProjectivePoint::IDENTITY;
    for share in contributions {
        check_tag(&first.tag, &share.tag)?;
        match seen.get_mut(share.party) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => return Err(Error::DuplicateContribution(share.party)),
            None => return Err(Error::InvalidPartyId(share.party)),
        }
        point += share.point;
    }

    if contributions.len() != n_parties {
        return Err(Error::InvalidShares(format!(
            "expected {} multiplication key contributions, got {}",
            n_parties,
            contributions.len()
        )));
    }

    Ok(JointMultKey {
        tag: first.tag.clone(),
        point,
    })
}
