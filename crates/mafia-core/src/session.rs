//! Per-party protocol state
//!
//! One [`PartySession`] per process. It owns the secret key share and every
//! artifact the protocol accumulates; request handlers borrow it under a
//! lock for local computation only.

use crate::codec::VectorCodec;
use crate::dkg::{DkgPhase, DkgState};
use crate::fhe::{
    Ciphertext, JointMultKey, KeyPair, KeySwitchMaterial, MultKeyShare, PartialShare, PublicKey,
    SecretKeyShare,
};
use crate::investigate::InvestigationResult;
use crate::threshold;
use crate::{Error, GameId, PartyId, Result, Role};

/// Everything one party knows about the running game
#[derive(Debug)]
pub struct PartySession {
    pub(crate) game_id: GameId,
    pub(crate) index: PartyId,
    pub(crate) n_parties: usize,
    pub(crate) dkg: DkgState,
    pub(crate) keypair: Option<KeyPair>,
    pub(crate) joint_key: Option<PublicKey>,
    pub(crate) eval_material: Option<KeySwitchMaterial>,
    pub(crate) mult_share: Option<MultKeyShare>,
    pub(crate) mult_key: Option<JointMultKey>,
    pub(crate) role_vectors: Vec<Ciphertext>,
    pub(crate) role: Option<Role>,
    pub(crate) alive: Vec<bool>,
    pub(crate) turn: u64,
    pub(crate) investigations: Vec<InvestigationResult>,
}

impl PartySession {
    pub fn new(game_id: impl Into<GameId>, index: PartyId, n_parties: usize) -> Result<Self> {
        if n_parties < 2 {
            return Err(Error::InvalidConfig(format!(
                "a game needs at least 2 parties, got {}",
                n_parties
            )));
        }
        if index >= n_parties {
            return Err(Error::InvalidPartyId(index));
        }

        Ok(Self {
            game_id: game_id.into(),
            index,
            n_parties,
            dkg: DkgState::default(),
            keypair: None,
            joint_key: None,
            eval_material: None,
            mult_share: None,
            mult_key: None,
            role_vectors: Vec::new(),
            role: None,
            alive: vec![true; n_parties],
            turn: 0,
            investigations: Vec::new(),
        })
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn index(&self) -> PartyId {
        self.index
    }

    pub fn n_parties(&self) -> usize {
        self.n_parties
    }

    pub fn phase(&self) -> DkgPhase {
        self.dkg.phase()
    }

    /// Own role, once revealed
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn mult_key(&self) -> Option<&JointMultKey> {
        self.mult_key.as_ref()
    }

    pub fn investigations(&self) -> &[InvestigationResult] {
        &self.investigations
    }

    pub fn is_alive(&self, party: PartyId) -> bool {
        self.alive.get(party).copied().unwrap_or(false)
    }

    /// Reject requests addressed to another game
    pub fn check_game(&self, game_id: &str) -> Result<()> {
        if self.game_id != game_id {
            return Err(Error::GameMismatch {
                expected: self.game_id.clone(),
                actual: game_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn secret(&self) -> Result<&SecretKeyShare> {
        self.keypair
            .as_ref()
            .map(|pair| &pair.secret)
            .ok_or_else(|| Error::CryptoState("secret key share not generated".into()))
    }

    pub fn joint_key(&self) -> Result<&PublicKey> {
        self.joint_key
            .as_ref()
            .ok_or_else(|| Error::CryptoState("joint public key not installed".into()))
    }

    /// Codec bound to the joint key
    pub fn codec(&self) -> Result<VectorCodec<'_>> {
        Ok(VectorCodec::new(self.joint_key()?))
    }

    /// Key setup finished
    pub fn require_keys(&self) -> Result<()> {
        if !self.dkg.is_complete() {
            return Err(Error::CryptoState(format!(
                "distributed key generation at {:?}",
                self.dkg.phase()
            )));
        }
        Ok(())
    }

    /// Setup finished: keys agreed and role vectors held
    pub fn require_ready(&self) -> Result<()> {
        self.require_keys()?;
        if self.role_vectors.len() != self.n_parties {
            return Err(Error::CryptoState("role vectors not distributed".into()));
        }
        Ok(())
    }

    /// Encrypted role vector of `party`
    pub fn role_vector(&self, party: PartyId) -> Result<&Ciphertext> {
        if self.role_vectors.is_empty() {
            return Err(Error::CryptoState("role vectors not distributed".into()));
        }
        self.role_vectors
            .get(party)
            .ok_or(Error::InvalidPartyId(party))
    }

    /// This party's share of `ct`
    pub fn partial_decrypt(&self, ct: &Ciphertext, is_lead: bool) -> Result<PartialShare> {
        Ok(threshold::partial_decrypt(
            ct,
            self.secret()?,
            self.index,
            is_lead,
        ))
    }

    /// Record the survivor list handed out with a new round
    pub fn update_survivors(&mut self, survivors: &[PartyId], turn: u64) -> Result<()> {
        let mut alive = vec![false; self.n_parties];
        for &party in survivors {
            *alive.get_mut(party).ok_or(Error::InvalidPartyId(party))? = true;
        }
        self.alive = alive;
        self.turn = turn;
        Ok(())
    }

    /// Every party other than this one, in join order
    pub fn peers(&self) -> Vec<PartyId> {
        (0..self.n_parties).filter(|p| *p != self.index).collect()
    }
}
