//! Blind role assignment, party side
//!
//! Every party holds all N encrypted role vectors. Owner `i` learns its own
//! role by fusing the other parties' shares of `roles[i]` with its own,
//! computed last. The fused plaintext never leaves the owner.

use crate::codec::{decode_role, VectorCodec};
use crate::fhe::{Ciphertext, PartialShare, PublicKey, ShareKind};
use crate::session::PartySession;
use crate::threshold::fuse;
use crate::{Error, GameId, Result, Role, Roster, ROLE_KINDS};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributeRolesRequest {
    pub game_id: GameId,
    pub joint_public_key: PublicKey,
    /// One role vector per party, in party order
    pub role_vectors: Vec<Ciphertext>,
}

/// Shares of the receiver's role vector from every other party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRoleRequest {
    pub game_id: GameId,
    pub shares: Vec<PartialShare>,
}

/// Encode a roster as one role vector per seat
pub fn encrypt_roster<R: RngCore + CryptoRng>(
    roster: &Roster,
    codec: &VectorCodec<'_>,
    rng: &mut R,
) -> Vec<Ciphertext> {
    roster
        .roles()
        .iter()
        .map(|role| codec.role_vector(*role, rng))
        .collect()
}

impl PartySession {
    /// Store the role vectors of every party; a repeat of the same set is a no-op
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn distribute_encrypted_roles(&mut self, req: &DistributeRolesRequest) -> Result<()> {
        self.check_game(&req.game_id)?;
        if !self.dkg.is_complete() {
            return Err(Error::CryptoState(format!(
                "roles distributed during {:?}",
                self.dkg.phase()
            )));
        }
        if *self.joint_key()? != req.joint_public_key {
            return Err(Error::ProtocolSequence(
                "role vectors encrypted under a different joint key".into(),
            ));
        }
        if req.role_vectors.len() != self.n_parties {
            return Err(Error::Shape {
                expected: self.n_parties,
                actual: req.role_vectors.len(),
            });
        }
        if let Some(bad) = req.role_vectors.iter().find(|ct| ct.len() != ROLE_KINDS) {
            return Err(Error::Shape {
                expected: ROLE_KINDS,
                actual: bad.len(),
            });
        }

        if !self.role_vectors.is_empty() {
            if self.role_vectors == req.role_vectors {
                return Ok(());
            }
            return Err(Error::ProtocolSequence(
                "role vectors are fixed once distributed".into(),
            ));
        }

        self.role_vectors = req.role_vectors.clone();
        info!(count = self.role_vectors.len(), "Encrypted roles stored");
        Ok(())
    }

    /// Fuse the other parties' shares with this party's own and learn the role
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn reveal_own_role(&mut self, req: &RevealRoleRequest, decode_bound: u64) -> Result<Role> {
        self.check_game(&req.game_id)?;
        self.require_ready()?;
        if self.role.is_some() {
            return Err(Error::ProtocolSequence("role already revealed".into()));
        }

        let expected = self.n_parties - 1;
        if req.shares.len() != expected {
            return Err(Error::InvalidShares(format!(
                "role reveal needs {} foreign shares, got {}",
                expected,
                req.shares.len()
            )));
        }
        if req.shares.iter().any(|s| s.party == self.index) {
            return Err(Error::InvalidShares(
                "role reveal shares must come from other parties".into(),
            ));
        }

        let has_lead = req.shares.iter().any(|s| s.kind == ShareKind::Lead);
        let own = self.partial_decrypt(self.role_vector(self.index)?, !has_lead)?;
        let mut shares = req.shares.clone();
        shares.push(own);

        let role = decode_role(&fuse(&shares, self.n_parties, decode_bound)?)?;
        self.role = Some(role);

        debug!(role = %role, "Own role revealed");
        Ok(role)
    }
}
