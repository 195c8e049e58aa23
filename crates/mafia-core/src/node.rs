//! Party node
//!
//! Wraps one [`PartySession`] behind a lock and serves every
//! [`PeerRequest`]. The lock is held for local computation only; it is
//! always released before the node talks to another party.

use crate::action::{
    build_triple, Abstain, ActionRequest, ActionTriple, DecisionContext, DecisionSource,
    DecoyReport, Phase,
};
use crate::audit::{AuditEvent, AuditSink, Milestone, NoopAudit};
use crate::fhe::{Ciphertext, PartialShare, Plaintext};
use crate::investigate::{decoy_probe, gather_partials, GatherPolicy, InvestigationResult};
use crate::relay::{self, RelayRequest, RelayStep};
use crate::session::PartySession;
use crate::threshold::fuse;
use crate::transport::{PeerRequest, PeerResponse, PeerTransport};
use crate::{Error, GameId, PartyId, ProtocolConfig, Result, Role};
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One party of the game
pub struct PartyNode {
    index: PartyId,
    n_parties: usize,
    game_id: GameId,
    session: Mutex<PartySession>,
    transport: Arc<dyn PeerTransport>,
    decisions: Arc<dyn DecisionSource>,
    audit: Arc<dyn AuditSink>,
    config: ProtocolConfig,
}

impl PartyNode {
    pub fn new(
        session: PartySession,
        transport: Arc<dyn PeerTransport>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            index: session.index(),
            n_parties: session.n_parties(),
            game_id: session.game_id().to_string(),
            session: Mutex::new(session),
            transport,
            decisions: Arc::new(Abstain),
            audit: Arc::new(NoopAudit),
            config,
        }
    }

    pub fn with_decisions(mut self, decisions: Arc<dyn DecisionSource>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn index(&self) -> PartyId {
        self.index
    }

    pub fn n_parties(&self) -> usize {
        self.n_parties
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Own role, once revealed
    pub async fn role(&self) -> Option<Role> {
        self.session.lock().await.role()
    }

    /// Investigations this party ran, oldest first
    pub async fn investigations(&self) -> Vec<InvestigationResult> {
        self.session.lock().await.investigations().to_vec()
    }

    fn record(&self, milestone: Milestone) {
        self.audit
            .record(AuditEvent::new(self.game_id.clone(), self.index, milestone));
    }

    /// Serve one request
    #[instrument(skip_all, fields(party = self.index, op = request.op()))]
    pub async fn handle(&self, request: PeerRequest) -> Result<PeerResponse> {
        match request {
            PeerRequest::GenerateLeadKey(req) => {
                let mut session = self.session.lock().await;
                let key = session.generate_lead_key(&req, &mut OsRng)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::PublicKey(key))
            }
            PeerRequest::JoinKey(req) => {
                let mut session = self.session.lock().await;
                let key = session.join_key(&req, &mut OsRng)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::PublicKey(key))
            }
            PeerRequest::InstallJointKey(req) => {
                let mut session = self.session.lock().await;
                session.install_joint_key(&req)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::Ack)
            }
            PeerRequest::GenerateEvalMultKey(req) => {
                let mut session = self.session.lock().await;
                let material = session.generate_eval_mult_key(&req)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::KeySwitch(material))
            }
            PeerRequest::GenerateKeySwitch(req) => {
                let mut session = self.session.lock().await;
                let material = session.generate_keyswitch(&req)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::KeySwitch(material))
            }
            PeerRequest::GenerateMultKey(req) => {
                let mut session = self.session.lock().await;
                let share = session.generate_mult_key(&req)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::MultKey(share))
            }
            PeerRequest::MergeMultKeys(req) => {
                let mut session = self.session.lock().await;
                let outcome = session.merge_mult_keys(&req)?;
                self.record(Milestone::DkgRound { phase: session.phase() });
                Ok(PeerResponse::Merged(outcome))
            }
            PeerRequest::DistributeRoles(req) => {
                self.session.lock().await.distribute_encrypted_roles(&req)?;
                self.record(Milestone::RolesDistributed);
                Ok(PeerResponse::Ack)
            }
            PeerRequest::PartialDecrypt(req) => {
                let share = self.session.lock().await.serve_partial(&req)?;
                Ok(PeerResponse::Share(share))
            }
            PeerRequest::RevealOwnRole(req) => {
                self.session
                    .lock()
                    .await
                    .reveal_own_role(&req, self.config.decode_bound)?;
                self.record(Milestone::RoleRevealed);
                // The acknowledgement never carries the role.
                Ok(PeerResponse::Ack)
            }
            PeerRequest::RelayStep(req) => Ok(PeerResponse::Shares(self.relay_step(req).await?)),
            PeerRequest::RelayDecrypt(req) => {
                self.check_game(&req.game_id)?;
                Ok(PeerResponse::Plaintext(
                    self.relay_decrypt(&req.ciphertext).await?,
                ))
            }
            PeerRequest::InvestigatePartial(req) => {
                let share = self.session.lock().await.investigate_partial(&req)?;
                debug!(request_id = %req.request_id, "Investigation share served");
                Ok(PeerResponse::Share(share))
            }
            PeerRequest::RequestAction(req) => {
                Ok(PeerResponse::Triple(self.request_action(&req).await?))
            }
        }
    }

    fn check_game(&self, game_id: &str) -> Result<()> {
        if self.game_id != game_id {
            return Err(Error::GameMismatch {
                expected: self.game_id.clone(),
                actual: game_id.to_string(),
            });
        }
        Ok(())
    }

    /// Contribute to a chain and pass it on
    async fn relay_step(&self, req: RelayRequest) -> Result<Vec<PartialShare>> {
        let step = {
            let session = self.session.lock().await;
            let share = session.relay_share(&req)?;
            req.advance(share)?
        };
        match step {
            RelayStep::Forward { to, request } => {
                relay::forward(self.transport.as_ref(), to, request).await
            }
            RelayStep::Complete(shares) => Ok(shares),
        }
    }

    /// Decrypt `ct` through the relay chain, fusing locally
    #[instrument(skip_all, fields(party = self.index))]
    pub async fn relay_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let request = {
            let session = self.session.lock().await;
            session.require_keys()?;
            RelayRequest::new(self.game_id.clone(), ct.clone(), self.index, self.n_parties)
        };
        let request_id = request.request_id;
        let hops = request.order.len();

        let chain = relay::dispatch(self.transport.as_ref(), request, self.config.relay_timeout())
            .await?;

        let plain = {
            let session = self.session.lock().await;
            let own = session.relay_closing_share(ct, &chain)?;
            let mut shares = chain;
            shares.push(own);
            fuse(&shares, self.n_parties, self.config.decode_bound)?
        };

        info!(%request_id, hops, "Relay decryption completed");
        self.record(Milestone::RelayCompleted { request_id, hops });
        Ok(plain)
    }

    /// Police only: learn whether `target` is Mafia. Never served to peers;
    /// the night path of [`Self::request_action`] starts it.
    #[instrument(skip_all, fields(party = self.index))]
    pub async fn run_investigation(&self, target: PartyId) -> Result<InvestigationResult> {
        let request_id = Uuid::new_v4();
        let (probe, lead, peers) = {
            let session = self.session.lock().await;
            let probe = session.prepare_investigation(target, &mut OsRng)?;
            let lead = session.partial_decrypt(&probe, true)?;
            (probe, lead, session.peers())
        };

        // Strict N-of-N: every key share is needed, dead parties included.
        let outcome = gather_partials(
            self.transport.as_ref(),
            request_id,
            &self.game_id,
            &peers,
            &probe,
            self.config.investigate_timeout(),
            GatherPolicy::RequireAll,
        )
        .await?;

        let mut shares = vec![lead];
        shares.extend(outcome.shares);
        let plain = fuse(&shares, self.n_parties, self.config.decode_bound)?;
        let is_mafia = plain.values().first() == Some(&1);

        let result = self
            .session
            .lock()
            .await
            .record_investigation(target, is_mafia);

        info!(%request_id, "Investigation completed");
        debug!(target, is_mafia, "Investigation result");
        self.record(Milestone::InvestigationCompleted { request_id });
        Ok(result)
    }

    /// Produce this party's triple for the round
    #[instrument(skip_all, fields(party = self.index, phase = %req.phase, turn = req.turn))]
    pub async fn request_action(&self, req: &ActionRequest) -> Result<ActionTriple> {
        let (role, alive, investigations) = {
            let mut session = self.session.lock().await;
            session.check_game(&req.game_id)?;
            session.require_ready()?;
            let role = session
                .role()
                .ok_or_else(|| Error::CryptoState("role not revealed".into()))?;
            session.update_survivors(&req.survivors, req.turn)?;
            let investigations = session.investigations().to_vec();
            (role, session.is_alive(self.index), investigations)
        };

        let target = match (alive, req.phase, role) {
            (false, _, _) | (_, Phase::Day, _) => None,
            (true, Phase::Night, Role::Citizen) => {
                let delay = self.config.citizen_delay(&mut OsRng);
                tokio::time::sleep(delay).await;
                None
            }
            (true, _, _) => {
                let ctx = DecisionContext {
                    party: self.index,
                    role,
                    phase: req.phase,
                    turn: req.turn,
                    survivors: req.survivors.clone(),
                    investigations,
                };
                self.decisions.decide(&ctx).await
            }
        };

        // Police runs the genuine probe in place of its decoy broadcast, so
        // every party sends exactly one investigate fan-out per night.
        let mut investigated = false;
        if req.phase == Phase::Night && role.investigates() {
            if let Some(suspect) = target {
                match self.run_investigation(suspect).await {
                    Ok(_) => investigated = true,
                    Err(e) => warn!(error = %e, "Investigation failed"),
                }
            }
        }

        let (triple, decoy) = {
            let session = self.session.lock().await;
            let codec = session.codec()?;
            let triple = build_triple(
                &codec,
                self.n_parties,
                role,
                alive,
                req.phase,
                target,
                &mut OsRng,
            )?;
            let decoy = (req.phase == Phase::Night && !investigated)
                .then(|| (decoy_probe(&codec, &mut OsRng), session.peers()));
            (triple, decoy)
        };

        if let Some((probe, peers)) = decoy {
            tokio::spawn(send_decoys(
                self.transport.clone(),
                self.audit.clone(),
                self.game_id.clone(),
                self.index,
                peers,
                probe,
                self.config.decoy_timeout(),
            ));
        }

        self.record(Milestone::TripleEmitted { turn: req.turn });
        Ok(triple)
    }

    /// Broadcast one decoy investigate request to every peer and wait for it
    pub async fn broadcast_decoys(&self) -> Result<DecoyReport> {
        let (probe, peers) = {
            let session = self.session.lock().await;
            (decoy_probe(&session.codec()?, &mut OsRng), session.peers())
        };
        Ok(send_decoys(
            self.transport.clone(),
            self.audit.clone(),
            self.game_id.clone(),
            self.index,
            peers,
            probe,
            self.config.decoy_timeout(),
        )
        .await)
    }
}

async fn send_decoys(
    transport: Arc<dyn PeerTransport>,
    audit: Arc<dyn AuditSink>,
    game_id: GameId,
    party: PartyId,
    peers: Vec<PartyId>,
    probe: Ciphertext,
    per_request: Duration,
) -> DecoyReport {
    let report = match gather_partials(
        transport.as_ref(),
        Uuid::new_v4(),
        &game_id,
        &peers,
        &probe,
        per_request,
        GatherPolicy::BestEffort,
    )
    .await
    {
        Ok(outcome) => DecoyReport {
            delivered: outcome.shares.len(),
            failed: outcome.missing.len(),
        },
        Err(e) => {
            debug!(error = %e, "Decoy broadcast failed");
            DecoyReport {
                delivered: 0,
                failed: peers.len(),
            }
        }
    };

    debug!(party, delivered = report.delivered, failed = report.failed, "Decoys sent");
    audit.record(AuditEvent::new(
        game_id,
        party,
        Milestone::DecoysSent {
            delivered: report.delivered,
            failed: report.failed,
        },
    ));
    report
}
