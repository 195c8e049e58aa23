//! Threshold decryptor
//!
//! Strict N-of-N: a fusion needs one lead share plus one non-lead share from
//! every other party. Anything less is rejected before the arithmetic runs,
//! and the arithmetic itself would not produce the plaintext anyway.

use crate::fhe::{
    combine_shares, decode_slots, decrypt_share, Ciphertext, PartialShare, Plaintext,
    SecretKeyShare, ShareKind,
};
use crate::session::PartySession;
use crate::{Error, GameId, PartyId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ask a party for its share of `ciphertext`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDecryptRequest {
    pub game_id: GameId,
    pub ciphertext: Ciphertext,
    pub is_lead: bool,
}

/// Lead contributor's share (applies the `c2` correction term)
pub fn partial_decrypt_lead(
    ct: &Ciphertext,
    secret: &SecretKeyShare,
    party: PartyId,
) -> PartialShare {
    decrypt_share(ct, secret, party, ShareKind::Lead)
}

/// Share of every other contributor
pub fn partial_decrypt_main(
    ct: &Ciphertext,
    secret: &SecretKeyShare,
    party: PartyId,
) -> PartialShare {
    decrypt_share(ct, secret, party, ShareKind::Main)
}

/// Dispatch on the `is_lead` flag carried by requests
pub fn partial_decrypt(
    ct: &Ciphertext,
    secret: &SecretKeyShare,
    party: PartyId,
    is_lead: bool,
) -> PartialShare {
    if is_lead {
        partial_decrypt_lead(ct, secret, party)
    } else {
        partial_decrypt_main(ct, secret, party)
    }
}

impl PartySession {
    /// Answer a share request from the host or a role owner
    pub fn serve_partial(&self, req: &PartialDecryptRequest) -> Result<PartialShare> {
        self.check_game(&req.game_id)?;
        self.require_keys()?;
        self.partial_decrypt(&req.ciphertext, req.is_lead)
    }
}

/// Check that `shares` is exactly one lead plus one non-lead per other party
fn validate(shares: &[PartialShare], n_parties: usize) -> Result<&PartialShare> {
    if shares.len() != n_parties {
        return Err(Error::InvalidShares(format!(
            "fusion needs {} shares, got {}",
            n_parties,
            shares.len()
        )));
    }

    let mut parties = HashSet::with_capacity(shares.len());
    let mut lead = None;
    for share in shares {
        if share.party >= n_parties {
            return Err(Error::InvalidPartyId(share.party));
        }
        if !parties.insert(share.party) {
            return Err(Error::InvalidShares(format!(
                "party {} contributed more than one share",
                share.party
            )));
        }
        if share.kind == ShareKind::Lead {
            if lead.is_some() {
                return Err(Error::InvalidShares("more than one lead share".into()));
            }
            lead = Some(share);
        }
    }

    let lead = lead.ok_or_else(|| Error::InvalidShares("missing lead share".into()))?;
    if let Some(odd) = shares.iter().find(|s| s.len() != lead.len()) {
        return Err(Error::Shape {
            expected: lead.len(),
            actual: odd.len(),
        });
    }
    Ok(lead)
}

/// Fuse a complete share set into the plaintext
pub fn fuse(shares: &[PartialShare], n_parties: usize, decode_bound: u64) -> Result<Plaintext> {
    let lead = validate(shares, n_parties)?;
    let mains: Vec<&PartialShare> = shares.iter().filter(|s| s.kind == ShareKind::Main).collect();
    let points = combine_shares(lead, &mains)?;
    decode_slots(&points, decode_bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VectorCodec;
    use crate::fhe::{combine_shares, keygen_join, keygen_lead, KeyPair};
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    const BOUND: u64 = 64;

    fn chain(n: usize) -> Vec<KeyPair> {
        let mut pairs = vec![keygen_lead(&mut OsRng)];
        for _ in 1..n {
            let prev = pairs.last().unwrap().public.clone();
            pairs.push(keygen_join(&prev, &mut OsRng));
        }
        pairs
    }

    fn shares_for(ct: &Ciphertext, pairs: &[KeyPair]) -> Vec<PartialShare> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, p)| partial_decrypt(ct, &p.secret, i, i == 0))
            .collect()
    }

    #[test]
    fn test_fuse_one_hot_every_index() {
        let pairs = chain(4);
        let joint = pairs.last().unwrap().public.clone();
        let codec = VectorCodec::new(&joint);

        for k in 0..4 {
            let ct = codec.one_hot(4, k, &mut OsRng).unwrap();
            let plain = fuse(&shares_for(&ct, &pairs), 4, BOUND).unwrap();
            let mut expected = vec![0u64; 4];
            expected[k] = 1;
            assert_eq!(plain.values(), expected.as_slice());
        }
    }

    #[test]
    fn test_fuse_zero_vector() {
        let pairs = chain(3);
        let joint = pairs.last().unwrap().public.clone();
        let ct = VectorCodec::new(&joint).zero(5, &mut OsRng);

        let plain = fuse(&shares_for(&ct, &pairs), 3, BOUND).unwrap();
        assert!(plain.is_zero());
        assert_eq!(plain.len(), 5);
    }

    #[test]
    fn test_lead_position_does_not_matter() {
        let pairs = chain(3);
        let joint = pairs.last().unwrap().public.clone();
        let ct = VectorCodec::new(&joint).one_hot(3, 1, &mut OsRng).unwrap();

        let shares: Vec<_> = pairs
            .iter()
            .enumerate()
            .map(|(i, p)| partial_decrypt(&ct, &p.secret, i, i == 2))
            .collect();
        assert_eq!(fuse(&shares, 3, BOUND).unwrap().values(), &[0, 1, 0]);
    }

    #[test]
    fn test_rejects_malformed_sets() {
        let pairs = chain(3);
        let joint = pairs.last().unwrap().public.clone();
        let ct = VectorCodec::new(&joint).one_hot(3, 0, &mut OsRng).unwrap();
        let shares = shares_for(&ct, &pairs);

        // missing lead
        let no_lead: Vec<_> = pairs
            .iter()
            .enumerate()
            .map(|(i, p)| partial_decrypt_main(&ct, &p.secret, i))
            .collect();
        assert!(matches!(fuse(&no_lead, 3, BOUND), Err(Error::InvalidShares(_))));

        // duplicate party
        let dup = vec![shares[0].clone(), shares[1].clone(), shares[1].clone()];
        assert!(matches!(fuse(&dup, 3, BOUND), Err(Error::InvalidShares(_))));

        // two leads
        let two_leads = vec![
            shares[0].clone(),
            partial_decrypt_lead(&ct, &pairs[1].secret, 1),
            shares[2].clone(),
        ];
        assert!(matches!(fuse(&two_leads, 3, BOUND), Err(Error::InvalidShares(_))));

        // short set
        assert!(matches!(fuse(&shares[..2], 3, BOUND), Err(Error::InvalidShares(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn omitting_any_share_never_recovers_plaintext(
            n in 2usize..6,
            hot in 0usize..6,
            omit in 0usize..6,
        ) {
            let hot = hot % n;
            let omit = omit % n;
            let pairs = chain(n);
            let joint = pairs.last().unwrap().public.clone();
            let ct = VectorCodec::new(&joint).one_hot(n, hot, &mut OsRng).unwrap();
            let shares = shares_for(&ct, &pairs);

            let kept: Vec<PartialShare> = shares
                .iter()
                .filter(|s| s.party != omit)
                .cloned()
                .collect();

            // The validated path refuses outright.
            prop_assert!(fuse(&kept, n, BOUND).is_err());
            // The raw arithmetic lands on an unrelated point.
            prop_assert!(fuse(&kept, n - 1, BOUND).is_err());

            if omit != 0 {
                let mains: Vec<&PartialShare> = kept.iter().skip(1).collect();
                let points = combine_shares(&kept[0], &mains).unwrap();
                let mut expected = vec![0u64; n];
                expected[hot] = 1;
                let decoded = decode_slots(&points, BOUND);
                prop_assert!(decoded.map(|p| p.0 != expected).unwrap_or(true));
            }
        }
    }
}
