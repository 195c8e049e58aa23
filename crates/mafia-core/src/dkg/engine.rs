//! Party-side DKG handlers

use super::{
    DkgPhase, EvalMultKeyRequest, InstallJointKeyRequest, JoinKeyRequest, KeySwitchRequest,
    LeadKeyRequest, MergeMultKeysRequest, MergeOutcome, MultKeyRequest,
};
use crate::fhe::{
    self, eval_mult_keygen, keygen_join, keygen_lead, multi_key_switch_gen, multi_mult_eval_key,
    KeySwitchMaterial, MultKeyShare, PublicKey,
};
use crate::session::PartySession;
use crate::{Error, Result, LEAD_PARTY};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, instrument};

impl PartySession {
    /// Lead only: first keypair of the chain
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn generate_lead_key<R: RngCore + CryptoRng>(
        &mut self,
        req: &LeadKeyRequest,
        rng: &mut R,
    ) -> Result<PublicKey> {
        self.check_game(&req.game_id)?;
        if self.index != LEAD_PARTY {
            return Err(Error::ProtocolSequence(format!(
                "party {} asked to generate the lead key",
                self.index
            )));
        }
        self.dkg
            .advance(DkgPhase::AwaitingKey, DkgPhase::KeyGenerated, "lead key")?;

        let pair = keygen_lead(rng);
        let public = pair.public.clone();
        self.keypair = Some(pair);

        debug!("Lead keypair generated");
        Ok(public)
    }

    /// Joiner: fold a fresh share into the previous running key
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn join_key<R: RngCore + CryptoRng>(
        &mut self,
        req: &JoinKeyRequest,
        rng: &mut R,
    ) -> Result<PublicKey> {
        self.check_game(&req.game_id)?;
        if self.index == LEAD_PARTY {
            return Err(Error::ProtocolSequence(
                "lead party cannot join its own chain".into(),
            ));
        }
        self.dkg
            .advance(DkgPhase::AwaitingKey, DkgPhase::KeyGenerated, "join key")?;

        let pair = keygen_join(&req.previous_public_key, rng);
        let public = pair.public.clone();
        self.keypair = Some(pair);

        debug!("Joined key chain");
        Ok(public)
    }

    /// Store the broadcast joint key; reinstalling the same key is a no-op
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn install_joint_key(&mut self, req: &InstallJointKeyRequest) -> Result<()> {
        self.check_game(&req.game_id)?;

        if let Some(existing) = &self.joint_key {
            if *existing == req.joint_public_key {
                return Ok(());
            }
            return Err(Error::ProtocolSequence(
                "a different joint key is already installed".into(),
            ));
        }
        self.dkg.expect(DkgPhase::KeyGenerated, "install joint key")?;

        // The last party of the chain produced the joint key itself.
        if self.index + 1 == self.n_parties {
            let own = self
                .keypair
                .as_ref()
                .map(|pair| &pair.public)
                .ok_or_else(|| Error::CryptoState("keypair missing".into()))?;
            if *own != req.joint_public_key {
                return Err(Error::Crypto(
                    "joint key does not match the end of the key chain".into(),
                ));
            }
        }

        self.joint_key = Some(req.joint_public_key.clone());
        self.dkg.advance(
            DkgPhase::KeyGenerated,
            DkgPhase::JointKeyInstalled,
            "install joint key",
        )?;

        info!(key_tag = %req.joint_public_key.key_tag(), "Joint public key installed");
        Ok(())
    }

    /// Round A
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn generate_eval_mult_key(
        &mut self,
        req: &EvalMultKeyRequest,
    ) -> Result<KeySwitchMaterial> {
        self.check_game(&req.game_id)?;
        self.dkg.expect(DkgPhase::JointKeyInstalled, "eval mult key")?;

        let tag = self.joint_key()?.key_tag();
        let material = eval_mult_keygen(self.secret()?, tag);
        self.eval_material = Some(material.clone());
        self.dkg.advance(
            DkgPhase::JointKeyInstalled,
            DkgPhase::EvalKeyGenerated,
            "eval mult key",
        )?;

        debug!("Round A material generated");
        Ok(material)
    }

    /// Round B
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn generate_keyswitch(&mut self, req: &KeySwitchRequest) -> Result<KeySwitchMaterial> {
        self.check_game(&req.game_id)?;
        self.dkg.expect(DkgPhase::EvalKeyGenerated, "key switch")?;

        match (self.index == LEAD_PARTY, req.previous.is_some()) {
            (true, true) => {
                return Err(Error::ProtocolSequence(
                    "lead starts the key switch chain from its own material".into(),
                ))
            }
            (false, false) => {
                return Err(Error::ProtocolSequence(format!(
                    "party {} needs the previous key switch material",
                    self.index
                )))
            }
            _ => {}
        }

        let own = self
            .eval_material
            .as_ref()
            .ok_or_else(|| Error::CryptoState("round A material missing".into()))?;
        let material = multi_key_switch_gen(self.secret()?, own, req.previous.as_ref())?;
        self.dkg.advance(
            DkgPhase::EvalKeyGenerated,
            DkgPhase::KeySwitchGenerated,
            "key switch",
        )?;

        debug!("Round B material generated");
        Ok(material)
    }

    /// Round C
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn generate_mult_key(&mut self, req: &MultKeyRequest) -> Result<MultKeyShare> {
        self.check_game(&req.game_id)?;
        self.dkg.expect(DkgPhase::KeySwitchGenerated, "mult key")?;

        let joint = self.joint_key()?;
        if req.key_tag != joint.key_tag() {
            return Err(Error::ProtocolSequence(format!(
                "mult key requested for key {}, installed key is {}",
                req.key_tag,
                joint.key_tag()
            )));
        }
        // The completed chain accumulates every `x_i·G`, i.e. the joint key.
        if req.combined.point != *joint.point() {
            return Err(Error::Crypto(
                "combined key switch material does not match the joint key".into(),
            ));
        }

        let share = multi_mult_eval_key(self.secret()?, self.index, &req.combined, &req.key_tag)?;
        self.mult_share = Some(share.clone());
        self.dkg.advance(
            DkgPhase::KeySwitchGenerated,
            DkgPhase::MultKeyGenerated,
            "mult key",
        )?;

        debug!("Round C contribution generated");
        Ok(share)
    }

    /// Merge every round C contribution into the joint multiplication key
    ///
    /// The party's own fragment is skipped rather than rejected, and merging
    /// an identical set again after completion succeeds without changes.
    #[instrument(skip_all, fields(party = self.index, game_id = %self.game_id))]
    pub fn merge_mult_keys(&mut self, req: &MergeMultKeysRequest) -> Result<MergeOutcome> {
        self.check_game(&req.game_id)?;

        if self.dkg.is_complete() {
            let merged = fhe::merge_mult_keys(&req.contributions, self.n_parties)?;
            if self.mult_key.as_ref() == Some(&merged) {
                return Ok(MergeOutcome {
                    inserted: 0,
                    skipped: req.contributions.len(),
                });
            }
            return Err(Error::ProtocolSequence(
                "a different multiplication key is already merged".into(),
            ));
        }
        self.dkg.expect(DkgPhase::MultKeyGenerated, "merge mult keys")?;

        let own = self
            .mult_share
            .clone()
            .ok_or_else(|| Error::CryptoState("own round C contribution missing".into()))?;

        let mut contributions = Vec::with_capacity(self.n_parties);
        let mut skipped = 0;
        for share in &req.contributions {
            if share.party == self.index {
                if *share != own {
                    return Err(Error::ProtocolSequence(
                        "merge carries a forged contribution for this party".into(),
                    ));
                }
                skipped += 1;
            } else {
                contributions.push(share.clone());
            }
        }
        let inserted = contributions.len();
        contributions.push(own);

        let merged = fhe::merge_mult_keys(&contributions, self.n_parties)?;
        let fingerprint = merged.fingerprint();
        self.mult_key = Some(merged);
        self.dkg.advance(
            DkgPhase::MultKeyGenerated,
            DkgPhase::Complete,
            "merge mult keys",
        )?;

        info!(
            mult_key = %fingerprint,
            inserted,
            skipped,
            "Multiplication key merged, setup complete"
        );
        Ok(MergeOutcome { inserted, skipped })
    }
}

/// Walk `n` in-process sessions up to round C, returning every contribution
#[cfg(test)]
pub(crate) fn setup_until_merge(game_id: &str, n: usize) -> (Vec<PartySession>, Vec<MultKeyShare>) {
    use rand::rngs::OsRng;

    let mut sessions: Vec<PartySession> = (0..n)
        .map(|i| PartySession::new(game_id, i, n).unwrap())
        .collect();
    let game_id = game_id.to_string();

    let mut key = sessions[0]
        .generate_lead_key(&LeadKeyRequest { game_id: game_id.clone() }, &mut OsRng)
        .unwrap();
    for session in sessions.iter_mut().skip(1) {
        key = session
            .join_key(
                &JoinKeyRequest {
                    game_id: game_id.clone(),
                    previous_public_key: key,
                },
                &mut OsRng,
            )
            .unwrap();
    }
    for session in sessions.iter_mut() {
        session
            .install_joint_key(&InstallJointKeyRequest {
                game_id: game_id.clone(),
                joint_public_key: key.clone(),
            })
            .unwrap();
        session
            .generate_eval_mult_key(&EvalMultKeyRequest { game_id: game_id.clone() })
            .unwrap();
    }

    let mut previous = None;
    for session in sessions.iter_mut() {
        previous = Some(
            session
                .generate_keyswitch(&KeySwitchRequest {
                    game_id: game_id.clone(),
                    previous,
                })
                .unwrap(),
        );
    }
    let combined = previous.unwrap();

    let contributions = sessions
        .iter_mut()
        .map(|s| {
            s.generate_mult_key(&MultKeyRequest {
                game_id: game_id.clone(),
                combined: combined.clone(),
                key_tag: key.key_tag(),
            })
            .unwrap()
        })
        .collect();
    (sessions, contributions)
}

/// Walk `n` in-process sessions through the full DKG
#[cfg(test)]
pub(crate) fn setup_sessions(game_id: &str, n: usize) -> Vec<PartySession> {
    let (mut sessions, contributions) = setup_until_merge(game_id, n);
    for session in sessions.iter_mut() {
        session
            .merge_mult_keys(&MergeMultKeysRequest {
                game_id: game_id.to_string(),
                contributions: contributions.clone(),
            })
            .unwrap();
    }
    sessions
}
