//! DKG driver

use crate::dkg::{
    EvalMultKeyRequest, InstallJointKeyRequest, JoinKeyRequest, KeySwitchRequest, LeadKeyRequest,
    MergeMultKeysRequest, MultKeyRequest,
};
use crate::fhe::{merge_mult_keys, JointMultKey, KeyTag, PublicKey};
use crate::transport::{PeerRequest, PeerResponse, PeerTransport};
use crate::{Error, GameId, PartyId, Result, LEAD_PARTY};
use futures_util::future::join_all;
use k256::ProjectivePoint;
use tracing::{info, instrument, warn};

/// Result of a completed setup
#[derive(Debug, Clone)]
pub struct DkgOutcome {
    pub joint_public_key: PublicKey,
    pub key_tag: KeyTag,
    pub mult_key: JointMultKey,
}

/// Walks every party through key generation in join order
pub struct DkgCoordinator<'a> {
    transport: &'a dyn PeerTransport,
    game_id: GameId,
    n_parties: usize,
}

impl<'a> DkgCoordinator<'a> {
    pub fn new(
        transport: &'a dyn PeerTransport,
        game_id: impl Into<GameId>,
        n_parties: usize,
    ) -> Self {
        Self {
            transport,
            game_id: game_id.into(),
            n_parties,
        }
    }

    /// Send one request per party concurrently, results in party order
    async fn broadcast<F>(&self, make: F) -> Vec<(PartyId, Result<PeerResponse>)>
    where
        F: Fn(PartyId) -> PeerRequest,
    {
        join_all((0..self.n_parties).map(|party| {
            let request = make(party);
            async move { (party, self.transport.send(party, request).await) }
        }))
        .await
    }

    /// Run the whole setup
    #[instrument(skip_all, fields(game_id = %self.game_id, n_parties = self.n_parties))]
    pub async fn run(&self) -> Result<DkgOutcome> {
        if self.n_parties < 2 {
            return Err(Error::InvalidConfig(format!(
                "a game needs at least 2 parties, got {}",
                self.n_parties
            )));
        }
        let game_id = self.game_id.clone();

        // Key chain in join order.
        let mut key = self
            .transport
            .send(
                LEAD_PARTY,
                PeerRequest::GenerateLeadKey(LeadKeyRequest {
                    game_id: game_id.clone(),
                }),
            )
            .await?
            .into_public_key()?;
        for party in 1..self.n_parties {
            key = self
                .transport
                .send(
                    party,
                    PeerRequest::JoinKey(JoinKeyRequest {
                        game_id: game_id.clone(),
                        previous_public_key: key,
                    }),
                )
                .await?
                .into_public_key()?;
        }
        let tag = key.key_tag();
        info!(key_tag = %tag, "Joint public key generated");

        for (party, result) in self
            .broadcast(|_| {
                PeerRequest::InstallJointKey(InstallJointKeyRequest {
                    game_id: game_id.clone(),
                    joint_public_key: key.clone(),
                })
            })
            .await
        {
            if let Err(e) = result.and_then(|r| r.into_ack()) {
                warn!(party, error = %e, "Joint key install failed");
                return Err(e);
            }
        }

        // Round A, then check the materials add up to the joint key.
        let mut sum = ProjectivePoint::IDENTITY;
        for (party, result) in self
            .broadcast(|_| {
                PeerRequest::GenerateEvalMultKey(EvalMultKeyRequest {
                    game_id: game_id.clone(),
                })
            })
            .await
        {
            let material = result?.into_key_switch()?;
            if material.tag != tag {
                return Err(Error::ProtocolSequence(format!(
                    "party {} answered round A for key {}",
                    party, material.tag
                )));
            }
            sum += material.point;
        }
        if sum != *key.point() {
            return Err(Error::Crypto(
                "round A materials do not sum to the joint public key".into(),
            ));
        }

        // Round B chain.
        let mut previous = None;
        for party in 0..self.n_parties {
            let material = self
                .transport
                .send(
                    party,
                    PeerRequest::GenerateKeySwitch(KeySwitchRequest {
                        game_id: game_id.clone(),
                        previous,
                    }),
                )
                .await?
                .into_key_switch()?;
            previous = Some(material);
        }
        let combined = previous.ok_or_else(|| Error::Internal("empty key switch chain".into()))?;

        // Round C.
        let mut contributions = Vec::with_capacity(self.n_parties);
        for (_, result) in self
            .broadcast(|_| {
                PeerRequest::GenerateMultKey(MultKeyRequest {
                    game_id: game_id.clone(),
                    combined: combined.clone(),
                    key_tag: tag.clone(),
                })
            })
            .await
        {
            contributions.push(result?.into_mult_key()?);
        }
        let mult_key = merge_mult_keys(&contributions, self.n_parties)?;

        for (party, result) in self
            .broadcast(|_| {
                PeerRequest::MergeMultKeys(MergeMultKeysRequest {
                    game_id: game_id.clone(),
                    contributions: contributions.clone(),
                })
            })
            .await
        {
            match result.and_then(|r| r.into_merged()) {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {
                    warn!(party, "Party already held a contribution, treated as merged");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            key_tag = %tag,
            mult_key = %mult_key.fingerprint(),
            "Distributed key generation completed"
        );
        Ok(DkgOutcome {
            joint_public_key: key,
            key_tag: tag,
            mult_key,
        })
    }
}
