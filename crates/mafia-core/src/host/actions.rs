//! Round collection and tallies

use crate::action::{ActionRequest, ActionTriple, Phase};
use crate::fhe::{Ciphertext, Plaintext};
use crate::relay::RelayDecryptRequest;
use crate::transport::{PeerRequest, PeerTransport};
use crate::{Error, GameId, PartyId, Result};
use futures_util::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Encrypted per-target counts of one round
#[derive(Debug, Clone)]
pub struct Tallies {
    pub vote: Ciphertext,
    pub attack: Ciphertext,
    pub heal: Ciphertext,
}

/// Validates submissions and accumulates them homomorphically
#[derive(Debug)]
pub struct ActionCollector {
    n_parties: usize,
    wire_len: Option<usize>,
    submitted: BTreeSet<PartyId>,
    tallies: Option<Tallies>,
}

impl ActionCollector {
    pub fn new(n_parties: usize) -> Self {
        Self {
            n_parties,
            wire_len: None,
            submitted: BTreeSet::new(),
            tallies: None,
        }
    }

    /// Accept one party's triple for the round
    ///
    /// Every vector must hold N slots and every triple must have the same
    /// encoded size; a second submission from the same party is rejected.
    pub fn submit_night_triple(&mut self, party: PartyId, triple: ActionTriple) -> Result<()> {
        if party >= self.n_parties {
            return Err(Error::InvalidPartyId(party));
        }
        if self.submitted.contains(&party) {
            return Err(Error::DuplicateContribution(party));
        }
        triple.check_shape(self.n_parties)?;

        let len = triple.wire_len();
        match self.wire_len {
            Some(expected) if expected != len => {
                return Err(Error::Shape {
                    expected,
                    actual: len,
                })
            }
            _ => self.wire_len = Some(len),
        }

        self.tallies = Some(match self.tallies.take() {
            None => Tallies {
                vote: triple.vote,
                attack: triple.attack,
                heal: triple.heal,
            },
            Some(acc) => Tallies {
                vote: acc.vote.add(&triple.vote)?,
                attack: acc.attack.add(&triple.attack)?,
                heal: acc.heal.add(&triple.heal)?,
            },
        });
        self.submitted.insert(party);
        debug!(party, bytes = len, "Triple accepted");
        Ok(())
    }

    pub fn submitted(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_complete(&self) -> bool {
        self.submitted.len() == self.n_parties
    }

    pub fn tallies(&self) -> Option<&Tallies> {
        self.tallies.as_ref()
    }

    /// Ask every party for its triple and collect them all
    #[instrument(skip(transport, survivors))]
    pub async fn collect_round(
        transport: &dyn PeerTransport,
        game_id: &GameId,
        n_parties: usize,
        phase: Phase,
        survivors: &[PartyId],
        turn: u64,
    ) -> Result<ActionCollector> {
        // Dead parties are asked too; they answer with zero vectors.
        let requests = (0..n_parties).map(|party| {
            let request = PeerRequest::RequestAction(ActionRequest {
                game_id: game_id.clone(),
                phase,
                survivors: survivors.to_vec(),
                turn,
            });
            async move { (party, transport.send(party, request).await) }
        });

        let mut collector = ActionCollector::new(n_parties);
        for (party, result) in join_all(requests).await {
            collector.submit_night_triple(party, result?.into_triple()?)?;
        }
        info!(submitted = collector.submitted(), "Round collected");
        Ok(collector)
    }
}

/// Have `via` run the relay chain over a public tally
pub async fn decrypt_tally(
    transport: &dyn PeerTransport,
    game_id: &GameId,
    via: PartyId,
    tally: &Ciphertext,
) -> Result<Plaintext> {
    transport
        .send(
            via,
            PeerRequest::RelayDecrypt(RelayDecryptRequest {
                game_id: game_id.clone(),
                ciphertext: tally.clone(),
            }),
        )
        .await?
        .into_plaintext()
}

fn most_counted(counts: &[u64]) -> Option<(PartyId, u64)> {
    counts
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, c)| *c > 0)
        .fold(None, |best, (i, c)| match best {
            Some((_, b)) if b >= c => best,
            _ => Some((i, c)),
        })
}

/// Night victim: most attacked party unless healed; ties go to the lowest index
pub fn resolve_night(attack: &Plaintext, heal: &Plaintext) -> Option<PartyId> {
    let (victim, _) = most_counted(attack.values())?;
    let healed = heal.values().get(victim).copied().unwrap_or(0) > 0;
    (!healed).then_some(victim)
}

/// Vote outcome: the unique most voted party, `None` on a tie or no votes
pub fn resolve_vote(vote: &Plaintext) -> Option<PartyId> {
    let (leader, count) = most_counted(vote.values())?;
    let tied = vote
        .values()
        .iter()
        .enumerate()
        .any(|(i, c)| i != leader && *c == count);
    (!tied).then_some(leader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::build_triple;
    use crate::dkg::setup_sessions;
    use crate::Role;
    use rand::rngs::OsRng;

    #[test]
    fn test_collector_validates_and_accumulates() {
        let sessions = setup_sessions("g", 3);
        let codec = sessions[0].codec().unwrap();
        let triple = |role, target| {
            build_triple(&codec, 3, role, true, Phase::Night, target, &mut OsRng).unwrap()
        };

        let mut collector = ActionCollector::new(3);
        collector.submit_night_triple(0, triple(Role::Mafia, Some(2))).unwrap();
        assert!(matches!(
            collector.submit_night_triple(0, triple(Role::Mafia, Some(1))),
            Err(Error::DuplicateContribution(0))
        ));

        let short = ActionTriple {
            vote: codec.zero(2, &mut OsRng),
            attack: codec.zero(3, &mut OsRng),
            heal: codec.zero(3, &mut OsRng),
        };
        assert!(matches!(
            collector.submit_night_triple(1, short),
            Err(Error::Shape { .. })
        ));

        collector.submit_night_triple(1, triple(Role::Doctor, Some(2))).unwrap();
        collector.submit_night_triple(2, triple(Role::Citizen, None)).unwrap();
        assert!(collector.is_complete());
        assert_eq!(collector.tallies().unwrap().attack.len(), 3);
    }

    #[test]
    fn test_resolve_night() {
        let attack = Plaintext(vec![0, 0, 1, 0]);
        assert_eq!(resolve_night(&attack, &Plaintext(vec![0; 4])), Some(2));
        assert_eq!(resolve_night(&attack, &Plaintext(vec![0, 0, 1, 0])), None);
        assert_eq!(resolve_night(&Plaintext(vec![0; 4]), &Plaintext(vec![0; 4])), None);
        assert_eq!(
            resolve_night(&Plaintext(vec![0, 1, 1, 0]), &Plaintext(vec![0; 4])),
            Some(1)
        );
    }

    #[test]
    fn test_resolve_vote() {
        assert_eq!(resolve_vote(&Plaintext(vec![0, 3, 1])), Some(1));
        assert_eq!(resolve_vote(&Plaintext(vec![2, 2, 0])), None);
        assert_eq!(resolve_vote(&Plaintext(vec![0, 0, 0])), None);
    }
}
