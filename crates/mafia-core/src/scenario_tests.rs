//! Whole-game scenarios over the in-memory transport

use crate::action::{ActionRequest, DecisionContext, FixedTarget, Phase};
use crate::codec::{decode_one_hot, VectorCodec};
use crate::dkg::EvalMultKeyRequest;
use crate::fhe::{PublicKey, ShareKind};
use crate::host::{
    decrypt_tally, resolve_night, resolve_vote, ActionCollector, BlindRoleAssigner, DkgCoordinator,
};
use crate::investigate::InvestigationResult;
use crate::relay::{self, RelayRequest};
use crate::roles::RevealRoleRequest;
use crate::threshold::PartialDecryptRequest;
use crate::transport::MemoryTransport;
use crate::transport::{PeerRequest, PeerResponse, PeerTransport};
use crate::{
    DecisionSource, Error, ErrorKind, PartyId, PartyNode, PartySession, ProtocolConfig, Role,
    Roster,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const GAME: &str = "scenario";
const ROLES: [Role; 4] = [Role::Citizen, Role::Mafia, Role::Doctor, Role::Police];

struct Game {
    transport: Arc<MemoryTransport>,
    nodes: Vec<Arc<PartyNode>>,
    joint_key: Option<PublicKey>,
}

fn test_config() -> ProtocolConfig {
    ProtocolConfig {
        relay_timeout_ms: 2_000,
        investigate_timeout_ms: 500,
        decoy_timeout_ms: 500,
        citizen_delay_min_ms: 0,
        citizen_delay_max_ms: 10,
        decode_bound: 64,
    }
}

/// Mafia and Doctor pick party 2, Police suspects party 1
fn decisions_for(role: Role) -> Arc<dyn DecisionSource> {
    match role {
        Role::Citizen => Arc::new(crate::action::Abstain),
        Role::Mafia | Role::Doctor => Arc::new(FixedTarget(2)),
        Role::Police => Arc::new(FixedTarget(1)),
    }
}

/// Remembers every context it was asked to decide on
struct RecordingSource {
    target: PartyId,
    seen: std::sync::Mutex<Vec<DecisionContext>>,
}

impl RecordingSource {
    fn new(target: PartyId) -> Arc<Self> {
        Arc::new(Self {
            target,
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<DecisionContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionSource for RecordingSource {
    async fn decide(&self, ctx: &DecisionContext) -> Option<PartyId> {
        self.seen.lock().unwrap().push(ctx.clone());
        Some(self.target)
    }
}

fn seat_parties() -> Game {
    seat_parties_with(test_config(), decisions_for)
}

fn seat_parties_with(
    config: ProtocolConfig,
    decisions: impl Fn(Role) -> Arc<dyn DecisionSource>,
) -> Game {
    let transport = MemoryTransport::new();
    let nodes = ROLES
        .iter()
        .enumerate()
        .map(|(index, role)| {
            let session = PartySession::new(GAME, index, ROLES.len()).unwrap();
            let node = Arc::new(
                PartyNode::new(session, transport.clone(), config.clone())
                    .with_decisions(decisions(*role)),
            );
            transport.register(&node);
            node
        })
        .collect();
    Game {
        transport,
        nodes,
        joint_key: None,
    }
}

async fn setup_game() -> Game {
    run_setup(seat_parties()).await
}

async fn run_setup(mut game: Game) -> Game {
    let outcome = DkgCoordinator::new(game.transport.as_ref(), GAME, ROLES.len())
        .run()
        .await
        .unwrap();
    game.joint_key = Some(outcome.joint_public_key);
    game
}

async fn assigned_game() -> Game {
    assign_roles(setup_game().await).await
}

async fn assign_roles(game: Game) -> Game {
    let roster = Roster::new(ROLES.to_vec()).unwrap();
    BlindRoleAssigner::new(game.transport.as_ref(), GAME, ROLES.len())
        .assign(&roster, game.joint_key.as_ref().unwrap())
        .await
        .unwrap();
    game
}

async fn wait_for_traffic(transport: &MemoryTransport, op: &str, count: usize) {
    for _ in 0..100 {
        if transport.traffic(op).len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_every_party_learns_only_its_role() {
    let game = assigned_game().await;
    for (node, expected) in game.nodes.iter().zip(ROLES) {
        assert_eq!(node.role().await, Some(expected));
    }
    assert_eq!(game.transport.traffic("reveal_own_role").len(), ROLES.len());
}

#[tokio::test]
async fn test_reveal_acknowledgement_carries_no_role() {
    let game = setup_game().await;
    let roster = Roster::new(ROLES.to_vec()).unwrap();
    let assigner = BlindRoleAssigner::new(game.transport.as_ref(), GAME, ROLES.len());
    let vectors = assigner
        .distribute(&roster, game.joint_key.as_ref().unwrap())
        .await
        .unwrap();

    let mut shares = Vec::new();
    for (i, party) in [0, 1, 2].into_iter().enumerate() {
        let response = game
            .transport
            .send(
                party,
                PeerRequest::PartialDecrypt(PartialDecryptRequest {
                    game_id: GAME.into(),
                    ciphertext: vectors[3].clone(),
                    is_lead: i == 0,
                }),
            )
            .await
            .unwrap();
        shares.push(response.into_share().unwrap());
    }

    let response = game
        .transport
        .send(
            3,
            PeerRequest::RevealOwnRole(RevealRoleRequest {
                game_id: GAME.into(),
                shares,
            }),
        )
        .await
        .unwrap();
    assert!(matches!(response, PeerResponse::Ack));
    assert_eq!(serde_json::to_value(&response).unwrap()["type"], "ack");
    assert_eq!(game.nodes[3].role().await, Some(Role::Police));
}

#[tokio::test]
async fn test_night_round_tallies_and_investigation() {
    let game = assigned_game().await;
    let survivors: Vec<usize> = (0..ROLES.len()).collect();

    let collector = ActionCollector::collect_round(
        game.transport.as_ref(),
        &GAME.to_string(),
        ROLES.len(),
        Phase::Night,
        &survivors,
        1,
    )
    .await
    .unwrap();
    assert!(collector.is_complete());

    let tallies = collector.tallies().unwrap();
    let attack = decrypt_tally(game.transport.as_ref(), &GAME.to_string(), 0, &tallies.attack)
        .await
        .unwrap();
    let heal = decrypt_tally(game.transport.as_ref(), &GAME.to_string(), 0, &tallies.heal)
        .await
        .unwrap();
    let vote = decrypt_tally(game.transport.as_ref(), &GAME.to_string(), 0, &tallies.vote)
        .await
        .unwrap();

    assert_eq!(decode_one_hot(&attack).unwrap(), Some(2));
    assert_eq!(decode_one_hot(&heal).unwrap(), Some(2));
    assert!(vote.is_zero());
    assert_eq!(resolve_night(&attack, &heal), None);

    let police = game.nodes[3].investigations().await;
    assert_eq!(police.len(), 1);
    assert_eq!(police[0].target, 1);
    assert!(police[0].is_mafia);
    assert_eq!(police[0].turn, 1);
    for node in &game.nodes[..3] {
        assert!(node.investigations().await.is_empty());
    }
}

#[tokio::test]
async fn test_police_decides_with_its_past_results() {
    let police = RecordingSource::new(1);
    let source = police.clone();
    let game = seat_parties_with(test_config(), move |role| match role {
        Role::Police => source.clone() as Arc<dyn DecisionSource>,
        other => decisions_for(other),
    });
    let game = assign_roles(run_setup(game).await).await;
    let survivors: Vec<usize> = (0..ROLES.len()).collect();

    for turn in [1, 2] {
        ActionCollector::collect_round(
            game.transport.as_ref(),
            &GAME.to_string(),
            ROLES.len(),
            Phase::Night,
            &survivors,
            turn,
        )
        .await
        .unwrap();
    }

    let seen = police.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].role, Role::Police);
    assert!(seen[0].investigations.is_empty());
    assert_eq!(seen[1].turn, 2);
    assert_eq!(
        seen[1].investigations,
        vec![InvestigationResult {
            target: 1,
            is_mafia: true,
            turn: 1,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_only_citizens_wait_before_submitting() {
    let config = ProtocolConfig {
        citizen_delay_min_ms: 1_000,
        citizen_delay_max_ms: 2_500,
        ..test_config()
    };
    let game = assign_roles(run_setup(seat_parties_with(config, decisions_for)).await).await;
    let request = ActionRequest {
        game_id: GAME.into(),
        phase: Phase::Night,
        survivors: (0..ROLES.len()).collect(),
        turn: 1,
    };

    // Mafia and Doctor answer without touching the clock.
    for party in [1, 2] {
        let answer =
            tokio::time::timeout(Duration::from_millis(1), game.nodes[party].request_action(&request))
                .await;
        assert!(matches!(answer, Ok(Ok(_))));
    }

    let citizen = game.nodes[0].clone();
    let citizen_request = request.clone();
    let mut handle =
        tokio::spawn(async move { citizen.request_action(&citizen_request).await });
    assert!(tokio::time::timeout(Duration::from_millis(999), &mut handle)
        .await
        .is_err());
    let answer = tokio::time::timeout(Duration::from_millis(1_600), handle).await;
    assert!(matches!(answer, Ok(Ok(Ok(_)))));
}

#[tokio::test]
async fn test_night_traffic_is_shape_uniform() {
    let game = assigned_game().await;
    let survivors: Vec<usize> = (0..ROLES.len()).collect();
    game.transport.clear_traffic();

    let requests = (0..ROLES.len()).map(|party| {
        let transport = game.transport.clone();
        async move {
            transport
                .send(
                    party,
                    PeerRequest::RequestAction(ActionRequest {
                        game_id: GAME.into(),
                        phase: Phase::Night,
                        survivors: (0..ROLES.len()).collect(),
                        turn: 1,
                    }),
                )
                .await
                .unwrap()
                .into_triple()
                .unwrap()
        }
    });
    let triples = futures_util::future::join_all(requests).await;
    let sizes: BTreeSet<usize> = triples.iter().map(|t| t.wire_len()).collect();
    assert_eq!(sizes.len(), 1);

    let action_sizes: BTreeSet<usize> = game
        .transport
        .traffic("request_action")
        .iter()
        .map(|r| r.bytes)
        .collect();
    assert_eq!(action_sizes.len(), 1);

    // One fan-out per party: three decoys plus the genuine probe.
    let expected = ROLES.len() * (ROLES.len() - 1);
    wait_for_traffic(&game.transport, "investigate_partial", expected).await;
    let probes = game.transport.traffic("investigate_partial");
    assert_eq!(probes.len(), expected);
    let probe_sizes: BTreeSet<usize> = probes.iter().map(|r| r.bytes).collect();
    assert_eq!(probe_sizes.len(), 1);
    assert!(survivors.iter().all(|p| probes.iter().filter(|r| r.to == *p).count() == 3));
}

#[tokio::test]
async fn test_dead_party_votes_zero() {
    let game = assigned_game().await;

    let collector = ActionCollector::collect_round(
        game.transport.as_ref(),
        &GAME.to_string(),
        ROLES.len(),
        Phase::Vote,
        &[0, 1, 2, 3],
        2,
    )
    .await
    .unwrap();
    let vote = decrypt_tally(
        game.transport.as_ref(),
        &GAME.to_string(),
        1,
        &collector.tallies().unwrap().vote,
    )
    .await
    .unwrap();
    assert_eq!(vote.values(), &[0, 1, 2, 0]);
    assert_eq!(resolve_vote(&vote), Some(2));

    // Party 2 is out; the Doctor's vote for 2 no longer counts.
    let collector = ActionCollector::collect_round(
        game.transport.as_ref(),
        &GAME.to_string(),
        ROLES.len(),
        Phase::Vote,
        &[0, 1, 3],
        3,
    )
    .await
    .unwrap();
    assert_eq!(collector.submitted(), ROLES.len());
    let vote = decrypt_tally(
        game.transport.as_ref(),
        &GAME.to_string(),
        1,
        &collector.tallies().unwrap().vote,
    )
    .await
    .unwrap();
    assert_eq!(vote.values(), &[0, 1, 1, 0]);
    assert_eq!(resolve_vote(&vote), None);
}

#[tokio::test]
async fn test_relay_chain_collects_every_share_once() {
    let game = setup_game().await;
    let codec = VectorCodec::new(game.joint_key.as_ref().unwrap());
    let ct = codec.one_hot(4, 3, &mut OsRng).unwrap();

    let request = RelayRequest::new(GAME, ct.clone(), 1, ROLES.len());
    let chain = relay::dispatch(game.transport.as_ref(), request, Duration::from_secs(2))
        .await
        .unwrap();
    let parties: BTreeSet<usize> = chain.iter().map(|s| s.party).collect();
    assert_eq!(parties, BTreeSet::from([0, 2, 3]));
    assert_eq!(chain[0].kind, ShareKind::Lead);
    assert!(chain[1..].iter().all(|s| s.kind == ShareKind::Main));

    let plain = game.nodes[1].relay_decrypt(&ct).await.unwrap();
    assert_eq!(decode_one_hot(&plain).unwrap(), Some(3));
}

#[tokio::test]
async fn test_relay_through_lead_requester() {
    let game = setup_game().await;
    let codec = VectorCodec::new(game.joint_key.as_ref().unwrap());
    let ct = codec.one_hot(4, 0, &mut OsRng).unwrap();

    let plain = game.nodes[0].relay_decrypt(&ct).await.unwrap();
    assert_eq!(plain.values(), &[1, 0, 0, 0]);
}

#[tokio::test]
async fn test_relay_reports_broken_hop() {
    let game = setup_game().await;
    let codec = VectorCodec::new(game.joint_key.as_ref().unwrap());
    let ct = codec.zero(4, &mut OsRng);
    game.transport.disconnect(2);

    let err = game.nodes[0].relay_decrypt(&ct).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ChainBreak | ErrorKind::Timeout));

    game.transport.reconnect(2);
    let plain = game.nodes[0].relay_decrypt(&ct).await.unwrap();
    assert!(plain.is_zero());
}

#[tokio::test(start_paused = true)]
async fn test_slow_chain_hits_relay_deadline() {
    let game = setup_game().await;
    let codec = VectorCodec::new(game.joint_key.as_ref().unwrap());
    let ct = codec.one_hot(4, 1, &mut OsRng).unwrap();

    // Three hops at 800 ms overrun the 2 s chain deadline.
    game.transport.set_latency(Duration::from_millis(800));
    let err = game.nodes[0].relay_decrypt(&ct).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    game.transport.set_latency(Duration::from_millis(600));
    let plain = game.nodes[0].relay_decrypt(&ct).await.unwrap();
    assert_eq!(decode_one_hot(&plain).unwrap(), Some(1));
}

#[tokio::test]
async fn test_investigation_requires_every_share() {
    let game = assigned_game().await;
    game.transport.disconnect(0);

    let err = game.nodes[3].run_investigation(1).await.unwrap_err();
    match err {
        Error::PartialTimeout { missing } => assert_eq!(missing, vec![0]),
        other => panic!("unexpected error: {}", other),
    }
    assert!(game.nodes[3].investigations().await.is_empty());

    game.transport.reconnect(0);
    let result = game.nodes[3].run_investigation(2).await.unwrap();
    assert!(!result.is_mafia);
}

#[tokio::test]
async fn test_only_police_investigates() {
    let game = assigned_game().await;
    let err = game.nodes[1].run_investigation(2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolSequence);
}

#[tokio::test]
async fn test_decoy_broadcast_tolerates_missing_peer() {
    let game = assigned_game().await;
    game.transport.disconnect(3);

    let report = game.nodes[0].broadcast_decoys().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_out_of_order_and_foreign_requests_rejected() {
    let game = seat_parties();
    let err = game
        .transport
        .send(
            1,
            PeerRequest::GenerateEvalMultKey(EvalMultKeyRequest {
                game_id: GAME.into(),
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
    assert_eq!(err.kind(), ErrorKind::ProtocolSequence);

    let game = assigned_game().await;
    let err = game
        .transport
        .send(
            2,
            PeerRequest::RequestAction(ActionRequest {
                game_id: "another-game".into(),
                phase: Phase::Vote,
                survivors: vec![0, 1, 2, 3],
                turn: 1,
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolSequence);
}

#[tokio::test]
async fn test_rerunning_setup_is_rejected() {
    let game = setup_game().await;
    let err = DkgCoordinator::new(game.transport.as_ref(), GAME, ROLES.len())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolSequence);
}
