//! Role assignment driver

use crate::codec::VectorCodec;
use crate::fhe::{Ciphertext, PublicKey};
use crate::roles::{encrypt_roster, DistributeRolesRequest, RevealRoleRequest};
use crate::threshold::PartialDecryptRequest;
use crate::transport::{PeerRequest, PeerTransport};
use crate::{Error, GameId, PartyId, Result, Roster};
use futures_util::future::join_all;
use rand::rngs::OsRng;
use tracing::{debug, info, instrument};

/// Hands out encrypted roles and runs one blind reveal per owner
pub struct BlindRoleAssigner<'a> {
    transport: &'a dyn PeerTransport,
    game_id: GameId,
    n_parties: usize,
}

impl<'a> BlindRoleAssigner<'a> {
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

    /// Encrypt `roster` under `joint_key` and store it at every party
    #[instrument(skip_all, fields(game_id = %self.game_id))]
    pub async fn distribute(
        &self,
        roster: &Roster,
        joint_key: &PublicKey,
    ) -> Result<Vec<Ciphertext>> {
        if roster.len() != self.n_parties {
            return Err(Error::InvalidConfig(format!(
                "roster has {} seats for {} parties",
                roster.len(),
                self.n_parties
            )));
        }
        let role_vectors = encrypt_roster(roster, &VectorCodec::new(joint_key), &mut OsRng);

        let requests = (0..self.n_parties).map(|party| {
            let request = PeerRequest::DistributeRoles(DistributeRolesRequest {
                game_id: self.game_id.clone(),
                joint_public_key: joint_key.clone(),
                role_vectors: role_vectors.clone(),
            });
            async move { self.transport.send(party, request).await?.into_ack() }
        });
        for result in join_all(requests).await {
            result?;
        }

        info!(n_parties = self.n_parties, "Encrypted roles distributed");
        Ok(role_vectors)
    }

    /// Reveal `owner`'s role to `owner` alone
    ///
    /// Every other party contributes a share, the first in join order as
    /// lead; the owner adds its own share and fuses.
    #[instrument(skip_all, fields(game_id = %self.game_id, owner = owner))]
    pub async fn reveal(&self, owner: PartyId, role_vector: &Ciphertext) -> Result<()> {
        let contributors: Vec<PartyId> = (0..self.n_parties).filter(|p| *p != owner).collect();

        let requests = contributors.iter().enumerate().map(|(i, &party)| {
            let request = PeerRequest::PartialDecrypt(PartialDecryptRequest {
                game_id: self.game_id.clone(),
                ciphertext: role_vector.clone(),
                is_lead: i == 0,
            });
            async move { self.transport.send(party, request).await?.into_share() }
        });
        let shares = join_all(requests)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        debug!(shares = shares.len(), "Shares gathered for owner");

        self.transport
            .send(
                owner,
                PeerRequest::RevealOwnRole(RevealRoleRequest {
                    game_id: self.game_id.clone(),
                    shares,
                }),
            )
            .await?
            .into_ack()
    }

    /// Reveal every party's role, one owner at a time
    pub async fn reveal_all(&self, role_vectors: &[Ciphertext]) -> Result<()> {
        if role_vectors.len() != self.n_parties {
            return Err(Error::Shape {
                expected: self.n_parties,
                actual: role_vectors.len(),
            });
        }
        for (owner, vector) in role_vectors.iter().enumerate() {
            self.reveal(owner, vector).await?;
        }
        info!(game_id = %self.game_id, "Every party learned its role");
        Ok(())
    }

    /// Distribute then reveal
    pub async fn assign(&self, roster: &Roster, joint_key: &PublicKey) -> Result<()> {
        let role_vectors = self.distribute(roster, joint_key).await?;
        self.reveal_all(&role_vectors).await
    }
}
