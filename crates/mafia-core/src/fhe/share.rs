//! Partial decryption shares and fusion arithmetic

use super::{b64, Ciphertext, Plaintext, SecretKeyShare};
use crate::{Error, PartyId, Result};
use k256::ProjectivePoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which combination formula a share follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareKind {
    /// Carries the `c2` correction term: `c2 - x·c1`
    Lead,
    /// Plain contribution: `x·c1`
    Main,
}

/// One party's contribution towards decrypting one ciphertext
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialShare {
    /// Producing party
    pub party: PartyId,
    /// Lead or non-lead
    pub kind: ShareKind,
    #[serde(with = "b64::points")]
    pub(crate) slots: Vec<ProjectivePoint>,
}

impl PartialShare {
    /// Number of slots covered
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for PartialShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialShare")
            .field("party", &self.party)
            .field("kind", &self.kind)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Compute a raw share of `ct` under `secret`
pub fn decrypt_share(
    ct: &Ciphertext,
    secret: &SecretKeyShare,
    party: PartyId,
    kind: ShareKind,
) -> PartialShare {
    let x = secret.scalar();
    let slots = ct
        .slots()
        .iter()
        .map(|slot| match kind {
            ShareKind::Lead => slot.c2 - slot.c1 * x,
            ShareKind::Main => slot.c1 * x,
        })
        .collect();

    PartialShare { party, kind, slots }
}

/// Raw fusion: lead share minus every non-lead share, slot-wise
///
/// No completeness checks happen here; see [`crate::threshold::fuse`].
pub fn combine_shares(
    lead: &PartialShare,
    mains: &[&PartialShare],
) -> Result<Vec<ProjectivePoint>> {
    let mut acc = lead.slots.clone();
    for share in mains {
        if share.slots.len() != acc.len() {
            return Err(Error::Shape {
                expected: acc.len(),
                actual: share.slots.len(),
            });
        }
        for (a, s) in acc.iter_mut().zip(&share.slots) {
            *a -= *s;
        }
    }
    Ok(acc)
}

/// Recover small plaintexts `m` from `m·G`, searching `0..=bound`
pub fn decode_slots(points: &[ProjectivePoint], bound: u64) -> Result<Plaintext> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let mut candidate = ProjectivePoint::IDENTITY;
            for m in 0..=bound {
                if candidate == *point {
                    return Ok(m);
                }
                candidate += ProjectivePoint::GENERATOR;
            }
            Err(Error::Crypto(format!(
                "slot {} does not decode to a value within 0..={}",
                i, bound
            )))
        })
        .collect::<Result<Vec<_>>>()
        .map(Plaintext)
}
