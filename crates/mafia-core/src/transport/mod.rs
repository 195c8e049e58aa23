//! Party-to-party transport
//!
//! Every protocol operation is one variant of [`PeerRequest`] answered by
//! one [`PeerResponse`]. The HTTP service maps each variant to its own
//! route; [`MemoryTransport`] delivers them in-process for tests.

mod memory;

pub use memory::MemoryTransport;

use crate::action::{ActionRequest, ActionTriple};
use crate::dkg::{
    EvalMultKeyRequest, InstallJointKeyRequest, JoinKeyRequest, KeySwitchRequest, LeadKeyRequest,
    MergeMultKeysRequest, MergeOutcome, MultKeyRequest,
};
use crate::fhe::{KeySwitchMaterial, MultKeyShare, PartialShare, Plaintext, PublicKey};
use crate::investigate::InvestigatePartialRequest;
use crate::relay::{RelayDecryptRequest, RelayRequest};
use crate::roles::{DistributeRolesRequest, RevealRoleRequest};
use crate::threshold::PartialDecryptRequest;
use crate::{Error, PartyId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Delivers one request to one party and waits for its answer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, to: PartyId, request: PeerRequest) -> Result<PeerResponse>;
}

/// Every operation a party serves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "body", rename_all = "snake_case")]
pub enum PeerRequest {
    GenerateLeadKey(LeadKeyRequest),
    JoinKey(JoinKeyRequest),
    InstallJointKey(InstallJointKeyRequest),
    GenerateEvalMultKey(EvalMultKeyRequest),
    GenerateKeySwitch(KeySwitchRequest),
    GenerateMultKey(MultKeyRequest),
    MergeMultKeys(MergeMultKeysRequest),
    DistributeRoles(DistributeRolesRequest),
    PartialDecrypt(PartialDecryptRequest),
    RevealOwnRole(RevealRoleRequest),
    RelayStep(RelayRequest),
    RelayDecrypt(RelayDecryptRequest),
    InvestigatePartial(InvestigatePartialRequest),
    RequestAction(ActionRequest),
}

impl PeerRequest {
    /// Wire name of the operation
    pub fn op(&self) -> &'static str {
        match self {
            PeerRequest::GenerateLeadKey(_) => "generate_lead_key",
            PeerRequest::JoinKey(_) => "join_key",
            PeerRequest::InstallJointKey(_) => "install_joint_key",
            PeerRequest::GenerateEvalMultKey(_) => "generate_eval_mult_key",
            PeerRequest::GenerateKeySwitch(_) => "generate_key_switch",
            PeerRequest::GenerateMultKey(_) => "generate_mult_key",
            PeerRequest::MergeMultKeys(_) => "merge_mult_keys",
            PeerRequest::DistributeRoles(_) => "distribute_roles",
            PeerRequest::PartialDecrypt(_) => "partial_decrypt",
            PeerRequest::RevealOwnRole(_) => "reveal_own_role",
            PeerRequest::RelayStep(_) => "relay_step",
            PeerRequest::RelayDecrypt(_) => "relay_decrypt",
            PeerRequest::InvestigatePartial(_) => "investigate_partial",
            PeerRequest::RequestAction(_) => "request_action",
        }
    }

    /// Game the request is addressed to
    pub fn game_id(&self) -> &str {
        match self {
            PeerRequest::GenerateLeadKey(r) => &r.game_id,
            PeerRequest::JoinKey(r) => &r.game_id,
            PeerRequest::InstallJointKey(r) => &r.game_id,
            PeerRequest::GenerateEvalMultKey(r) => &r.game_id,
            PeerRequest::GenerateKeySwitch(r) => &r.game_id,
            PeerRequest::GenerateMultKey(r) => &r.game_id,
            PeerRequest::MergeMultKeys(r) => &r.game_id,
            PeerRequest::DistributeRoles(r) => &r.game_id,
            PeerRequest::PartialDecrypt(r) => &r.game_id,
            PeerRequest::RevealOwnRole(r) => &r.game_id,
            PeerRequest::RelayStep(r) => &r.game_id,
            PeerRequest::RelayDecrypt(r) => &r.game_id,
            PeerRequest::InvestigatePartial(r) => &r.game_id,
            PeerRequest::RequestAction(r) => &r.game_id,
        }
    }

    /// JSON body without the operation tag
    pub fn body(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        value
            .get_mut("body")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Serialization(format!("{} has no body", self.op())))
    }

    /// Rebuild a request from its operation name and body
    pub fn from_parts(op: &str, body: serde_json::Value) -> Result<Self> {
        let tagged = serde_json::json!({ "op": op, "body": body });
        serde_json::from_value(tagged)
            .map_err(|e| Error::Deserialization(format!("{} request: {}", op, e)))
    }
}

/// Answers to [`PeerRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum PeerResponse {
    PublicKey(PublicKey),
    Ack,
    KeySwitch(KeySwitchMaterial),
    MultKey(MultKeyShare),
    Merged(MergeOutcome),
    Share(PartialShare),
    Shares(Vec<PartialShare>),
    Plaintext(Plaintext),
    Triple(ActionTriple),
}

fn unexpected(expected: &str, got: &PeerResponse) -> Error {
    Error::UnexpectedResponse(format!("expected {}, got {}", expected, got.kind()))
}

impl PeerResponse {
    fn kind(&self) -> &'static str {
        match self {
            PeerResponse::PublicKey(_) => "public_key",
            PeerResponse::Ack => "ack",
            PeerResponse::KeySwitch(_) => "key_switch",
            PeerResponse::MultKey(_) => "mult_key",
            PeerResponse::Merged(_) => "merged",
            PeerResponse::Share(_) => "share",
            PeerResponse::Shares(_) => "shares",
            PeerResponse::Plaintext(_) => "plaintext",
            PeerResponse::Triple(_) => "triple",
        }
    }

    pub fn into_public_key(self) -> Result<PublicKey> {
        match self {
            PeerResponse::PublicKey(key) => Ok(key),
            other => Err(unexpected("public_key", &other)),
        }
    }

    pub fn into_ack(self) -> Result<()> {
        match self {
            PeerResponse::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }

    pub fn into_key_switch(self) -> Result<KeySwitchMaterial> {
        match self {
            PeerResponse::KeySwitch(material) => Ok(material),
            other => Err(unexpected("key_switch", &other)),
        }
    }

    pub fn into_mult_key(self) -> Result<MultKeyShare> {
        match self {
            PeerResponse::MultKey(share) => Ok(share),
            other => Err(unexpected("mult_key", &other)),
        }
    }

    pub fn into_merged(self) -> Result<MergeOutcome> {
        match self {
            PeerResponse::Merged(outcome) => Ok(outcome),
            other => Err(unexpected("merged", &other)),
        }
    }

    pub fn into_share(self) -> Result<PartialShare> {
        match self {
            PeerResponse::Share(share) => Ok(share),
            other => Err(unexpected("share", &other)),
        }
    }

    pub fn into_shares(self) -> Result<Vec<PartialShare>> {
        match self {
            PeerResponse::Shares(shares) => Ok(shares),
            other => Err(unexpected("shares", &other)),
        }
    }

    pub fn into_plaintext(self) -> Result<Plaintext> {
        match self {
            PeerResponse::Plaintext(plain) => Ok(plain),
            other => Err(unexpected("plaintext", &other)),
        }
    }

    pub fn into_triple(self) -> Result<ActionTriple> {
        match self {
            PeerResponse::Triple(triple) => Ok(triple),
            other => Err(unexpected("triple", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parts_roundtrip() {
        let request = PeerRequest::RequestAction(ActionRequest {
            game_id: "g".into(),
            phase: crate::Phase::Night,
            survivors: vec![0, 2],
            turn: 3,
        });
        let body = request.body().unwrap();
        assert_eq!(body["turn"], 3);

        let back = PeerRequest::from_parts(request.op(), body).unwrap();
        assert_eq!(back.op(), "request_action");
        assert_eq!(back.game_id(), "g");
    }

    #[test]
    fn test_investigation_cannot_be_started_remotely() {
        let body = serde_json::json!({ "game_id": "g", "target": 1 });
        let err = PeerRequest::from_parts("run_investigation", body).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_unknown_op_is_deserialization_error() {
        let err = PeerRequest::from_parts("launch", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_response_helpers() {
        assert!(PeerResponse::Ack.into_ack().is_ok());
        let err = PeerResponse::Ack.into_shares().unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));

        let json = serde_json::to_value(PeerResponse::Ack).unwrap();
        assert_eq!(json["type"], "ack");
    }
}
