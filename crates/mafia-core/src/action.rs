//! Blind action protocol
//!
//! Every live party answers every round with exactly one
//! `(vote, attack, heal)` triple of length-N ciphertexts. Only the vector
//! the party's role and the phase entitle it to fill carries a choice; the
//! rest are fresh encryptions of zero.

use crate::codec::VectorCodec;
use crate::fhe::Ciphertext;
use crate::investigate::InvestigationResult;
use crate::{Error, GameId, PartyId, Result, Role};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Game phase a triple is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Night,
    Vote,
    /// Discussion; every vector is a zero vector
    #[serde(alias = "chat")]
    Day,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Night => "night",
            Phase::Vote => "vote",
            Phase::Day => "day",
        };
        f.write_str(label)
    }
}

/// Host asks a party for its triple of the round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub game_id: GameId,
    pub phase: Phase,
    pub survivors: Vec<PartyId>,
    pub turn: u64,
}

/// One party's submission for a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTriple {
    pub vote: Ciphertext,
    pub attack: Ciphertext,
    pub heal: Ciphertext,
}

impl ActionTriple {
    /// All three vectors hold `n_parties` slots
    pub fn check_shape(&self, n_parties: usize) -> Result<()> {
        for ct in [&self.vote, &self.attack, &self.heal] {
            if ct.len() != n_parties {
                return Err(Error::Shape {
                    expected: n_parties,
                    actual: ct.len(),
                });
            }
        }
        Ok(())
    }

    /// Bytes on the wire
    pub fn wire_len(&self) -> usize {
        [&self.vote, &self.attack, &self.heal]
            .iter()
            .map(|ct| ct.to_bytes().len())
            .sum()
    }
}

/// What a party knows when it decides
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub party: PartyId,
    pub role: Role,
    pub phase: Phase,
    pub turn: u64,
    pub survivors: Vec<PartyId>,
    /// Results of this party's own past investigations, oldest first
    pub investigations: Vec<InvestigationResult>,
}

/// Decision maker behind a party: a player, a policy, or a test script
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Target for the phase, or `None` to abstain
    async fn decide(&self, ctx: &DecisionContext) -> Option<PartyId>;
}

/// Always abstains
#[derive(Debug, Default, Clone, Copy)]
pub struct Abstain;

#[async_trait]
impl DecisionSource for Abstain {
    async fn decide(&self, _ctx: &DecisionContext) -> Option<PartyId> {
        None
    }
}

/// Always picks the same party
#[derive(Debug, Clone, Copy)]
pub struct FixedTarget(pub PartyId);

#[async_trait]
impl DecisionSource for FixedTarget {
    async fn decide(&self, _ctx: &DecisionContext) -> Option<PartyId> {
        Some(self.0)
    }
}

/// Picks a random survivor other than itself
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSurvivor;

#[async_trait]
impl DecisionSource for RandomSurvivor {
    async fn decide(&self, ctx: &DecisionContext) -> Option<PartyId> {
        let others: Vec<PartyId> = ctx
            .survivors
            .iter()
            .copied()
            .filter(|p| *p != ctx.party)
            .collect();
        others.choose(&mut rand::rngs::OsRng).copied()
    }
}

/// Build the triple for `role` in `phase`
///
/// `alive == false` forces zeros regardless of role or target.
pub fn build_triple<R: RngCore + CryptoRng>(
    codec: &VectorCodec<'_>,
    n_parties: usize,
    role: Role,
    alive: bool,
    phase: Phase,
    target: Option<PartyId>,
    rng: &mut R,
) -> Result<ActionTriple> {
    if let Some(t) = target {
        if t >= n_parties {
            return Err(Error::InvalidTarget(format!(
                "party {} is not seated in a game of {}",
                t, n_parties
            )));
        }
    }
    let target = target.filter(|_| alive);

    let (vote, attack, heal) = match phase {
        Phase::Vote => (target, None, None),
        Phase::Night => (None, role.attack_target(target), role.heal_target(target)),
        Phase::Day => (None, None, None),
    };

    Ok(ActionTriple {
        vote: codec.choice(n_parties, vote, rng)?,
        attack: codec.choice(n_parties, attack, rng)?,
        heal: codec.choice(n_parties, heal, rng)?,
    })
}

/// Outcome of a decoy broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoyReport {
    pub delivered: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dkg::setup_sessions;
    use crate::fhe::PartialShare;
    use crate::session::PartySession;
    use crate::threshold::fuse;
    use rand::rngs::OsRng;

    fn open(sessions: &[PartySession], ct: &Ciphertext) -> Vec<u64> {
        let shares: Vec<PartialShare> = sessions
            .iter()
            .map(|s| s.partial_decrypt(ct, s.index() == 0).unwrap())
            .collect();
        fuse(&shares, sessions.len(), 16).unwrap().0
    }

    #[test]
    fn test_night_only_role_vector_is_filled() {
        let sessions = setup_sessions("g", 4);
        let codec = sessions[0].codec().unwrap();

        let mafia = build_triple(&codec, 4, Role::Mafia, true, Phase::Night, Some(2), &mut OsRng)
            .unwrap();
        assert_eq!(open(&sessions, &mafia.attack), vec![0, 0, 1, 0]);
        assert_eq!(open(&sessions, &mafia.heal), vec![0; 4]);
        assert_eq!(open(&sessions, &mafia.vote), vec![0; 4]);

        let police = build_triple(&codec, 4, Role::Police, true, Phase::Night, Some(1), &mut OsRng)
            .unwrap();
        for ct in [&police.vote, &police.attack, &police.heal] {
            assert_eq!(open(&sessions, ct), vec![0; 4]);
        }
    }

    #[test]
    fn test_vote_and_dead_parties() {
        let sessions = setup_sessions("g", 3);
        let codec = sessions[0].codec().unwrap();

        let vote = build_triple(&codec, 3, Role::Doctor, true, Phase::Vote, Some(0), &mut OsRng)
            .unwrap();
        assert_eq!(open(&sessions, &vote.vote), vec![1, 0, 0]);
        assert_eq!(open(&sessions, &vote.heal), vec![0; 3]);

        let dead = build_triple(&codec, 3, Role::Mafia, false, Phase::Night, Some(0), &mut OsRng)
            .unwrap();
        assert_eq!(open(&sessions, &dead.attack), vec![0; 3]);
    }

    #[test]
    fn test_every_triple_has_the_same_wire_len() {
        let sessions = setup_sessions("g", 4);
        let codec = sessions[0].codec().unwrap();

        let lens: Vec<usize> = Role::ALL
            .iter()
            .flat_map(|role| {
                [Phase::Night, Phase::Vote, Phase::Day].map(|phase| {
                    let t = build_triple(&codec, 4, *role, true, phase, Some(1), &mut OsRng)
                        .unwrap();
                    t.check_shape(4).unwrap();
                    t.wire_len()
                })
            })
            .collect();
        assert!(lens.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_rejects_unseated_target() {
        let sessions = setup_sessions("g", 3);
        let codec = sessions[0].codec().unwrap();
        assert!(matches!(
            build_triple(&codec, 3, Role::Mafia, true, Phase::Night, Some(5), &mut OsRng),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_random_survivor_never_picks_self() {
        let ctx = DecisionContext {
            party: 1,
            role: Role::Citizen,
            phase: Phase::Vote,
            turn: 1,
            survivors: vec![1, 2],
            investigations: Vec::new(),
        };
        for _ in 0..8 {
            assert_eq!(RandomSurvivor.decide(&ctx).await, Some(2));
        }
    }
}
