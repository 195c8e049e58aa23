//! Parallel investigation
//!
//! The investigator projects `roles[target]` onto the Mafia coordinate,
//! contributes the lead share itself and fans out to every other party at
//! once. Real probes and decoys travel through the same request type with
//! the same ciphertext shape.

use crate::codec::VectorCodec;
use crate::fhe::{Ciphertext, PartialShare};
use crate::session::PartySession;
use crate::transport::{PeerRequest, PeerTransport};
use crate::{Error, GameId, PartyId, Result, Role, ROLE_KINDS};
use futures_util::future::join_all;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Plaintext weights selecting the Mafia coordinate of a role vector
pub const MAFIA_INDICATOR: [u64; ROLE_KINDS] = [0, 1, 0, 0];

/// Slot count of every investigate request, real or decoy
pub const PROBE_SLOTS: usize = 1;

/// How a fan-out treats peers that fail or time out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherPolicy {
    /// Any missing share fails the gather with [`Error::PartialTimeout`]
    RequireAll,
    /// Missing shares are dropped and reported
    BestEffort,
}

/// Shares collected by a fan-out, plus the peers that did not answer
#[derive(Debug, Default)]
pub struct GatherOutcome {
    pub shares: Vec<PartialShare>,
    pub missing: Vec<PartyId>,
}

/// Request for a non-lead share of an investigation probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigatePartialRequest {
    pub request_id: Uuid,
    pub game_id: GameId,
    pub ciphertext: Ciphertext,
}

/// Outcome of one investigation, kept by the investigator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub target: PartyId,
    pub is_mafia: bool,
    pub turn: u64,
}

/// Encrypted `1` if `role_vector` holds Mafia, `0` otherwise, rerandomized
/// so it cannot be linked to the role vector it came from
pub fn mafia_probe<R: RngCore + CryptoRng>(
    role_vector: &Ciphertext,
    codec: &VectorCodec<'_>,
    rng: &mut R,
) -> Result<Ciphertext> {
    role_vector
        .inner_product(&MAFIA_INDICATOR)?
        .add(&codec.zero(PROBE_SLOTS, rng))
}

/// Decoy probe, shape-identical to [`mafia_probe`]
pub fn decoy_probe<R: RngCore + CryptoRng>(codec: &VectorCodec<'_>, rng: &mut R) -> Ciphertext {
    codec.zero(PROBE_SLOTS, rng)
}

impl PartySession {
    /// Build the probe for a genuine investigation of `target`
    pub fn prepare_investigation<R: RngCore + CryptoRng>(
        &self,
        target: PartyId,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        self.require_ready()?;
        if self.role != Some(Role::Police) {
            return Err(Error::ProtocolSequence(
                "only the police may investigate".into(),
            ));
        }
        if target == self.index {
            return Err(Error::InvalidTarget("police cannot investigate itself".into()));
        }
        if target >= self.n_parties {
            return Err(Error::InvalidTarget(format!(
                "party {} is not seated in a game of {}",
                target, self.n_parties
            )));
        }
        mafia_probe(self.role_vector(target)?, &self.codec()?, rng)
    }

    /// Answer an investigate request with a non-lead share
    pub fn investigate_partial(&self, req: &InvestigatePartialRequest) -> Result<PartialShare> {
        self.check_game(&req.game_id)?;
        if req.ciphertext.len() != PROBE_SLOTS {
            return Err(Error::Shape {
                expected: PROBE_SLOTS,
                actual: req.ciphertext.len(),
            });
        }
        self.partial_decrypt(&req.ciphertext, false)
    }

    pub(crate) fn record_investigation(&mut self, target: PartyId, is_mafia: bool) -> InvestigationResult {
        let result = InvestigationResult {
            target,
            is_mafia,
            turn: self.turn,
        };
        self.investigations.push(result);
        result
    }
}

/// Send `ciphertext` to every peer concurrently, each request bounded by
/// `per_request`
pub async fn gather_partials(
    transport: &dyn PeerTransport,
    request_id: Uuid,
    game_id: &str,
    peers: &[PartyId],
    ciphertext: &Ciphertext,
    per_request: Duration,
    policy: GatherPolicy,
) -> Result<GatherOutcome> {
    let requests = peers.iter().map(|&peer| {
        let request = PeerRequest::InvestigatePartial(InvestigatePartialRequest {
            request_id,
            game_id: game_id.to_string(),
            ciphertext: ciphertext.clone(),
        });
        async move {
            let result = match tokio::time::timeout(per_request, transport.send(peer, request)).await
            {
                Ok(Ok(response)) => response.into_share(),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::Timeout(format!("investigate share from {}", peer))),
            };
            (peer, result)
        }
    });

    let mut outcome = GatherOutcome::default();
    for (peer, result) in join_all(requests).await {
        match result {
            Ok(share) if share.party == peer => outcome.shares.push(share),
            Ok(share) => {
                debug!(%request_id, peer, claimed = share.party, "Share attributed to wrong party");
                outcome.missing.push(peer);
            }
            Err(e) => {
                debug!(%request_id, peer, error = %e, "Partial share not received");
                outcome.missing.push(peer);
            }
        }
    }

    if policy == GatherPolicy::RequireAll && !outcome.missing.is_empty() {
        return Err(Error::PartialTimeout {
            missing: outcome.missing,
        });
    }
    Ok(outcome)
}
