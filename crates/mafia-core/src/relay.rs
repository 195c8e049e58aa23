//! Relay decryption chain
//!
//! A ciphertext travels hop by hop through every party except the requester.
//! Each hop appends its share and forwards the growing list; the last hop
//! returns the list back down the chain to the requester, which adds its own
//! share and is the only party that fuses.
//!
//! ```text
//! requester -> order[0] (lead share) -> order[1] -> ... -> order[k-1]
//!           <-------------------- shares ---------------------
//! ```
//!
//! [`RelayRequest::advance`] is the whole state machine; the async helpers
//! only move requests over a [`PeerTransport`].

use crate::fhe::{Ciphertext, PartialShare, ShareKind};
use crate::session::PartySession;
use crate::transport::{PeerRequest, PeerTransport};
use crate::{Error, ErrorKind, GameId, PartyId, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Hand-off state of one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub request_id: Uuid,
    pub game_id: GameId,
    pub ciphertext: Ciphertext,
    /// Shares accumulated so far, in hop order
    pub shares: Vec<PartialShare>,
    /// Hops still to visit, requester excluded
    pub order: Vec<PartyId>,
    /// Index into `order` of the party holding the request
    pub cursor: usize,
}

/// What a hop does after contributing
#[derive(Debug)]
pub enum RelayStep {
    Forward { to: PartyId, request: RelayRequest },
    Complete(Vec<PartialShare>),
}

/// Ask the host to run the chain over `ciphertext` and return the plaintext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDecryptRequest {
    pub game_id: GameId,
    pub ciphertext: Ciphertext,
}

impl RelayRequest {
    /// Chain visiting every party but `requester`, in join order
    pub fn new(
        game_id: impl Into<GameId>,
        ciphertext: Ciphertext,
        requester: PartyId,
        n_parties: usize,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            game_id: game_id.into(),
            ciphertext,
            shares: Vec::new(),
            order: (0..n_parties).filter(|p| *p != requester).collect(),
            cursor: 0,
        }
    }

    /// Party expected to handle the request next
    pub fn current_hop(&self) -> Option<PartyId> {
        self.order.get(self.cursor).copied()
    }

    /// First hop of a chain contributes the lead share
    pub fn is_lead_hop(&self) -> bool {
        self.shares.is_empty()
    }

    /// Append the current hop's share and decide where the request goes next
    pub fn advance(mut self, share: PartialShare) -> Result<RelayStep> {
        let hop = self.current_hop().ok_or_else(|| {
            Error::ProtocolSequence(format!("relay {} has no hops left", self.request_id))
        })?;
        if share.party != hop {
            return Err(Error::ProtocolSequence(format!(
                "relay {} expected a share from party {}, got party {}",
                self.request_id, hop, share.party
            )));
        }
        let lead_expected = self.is_lead_hop();
        if (share.kind == ShareKind::Lead) != lead_expected {
            return Err(Error::InvalidShares(format!(
                "hop {} produced a {:?} share out of place",
                hop, share.kind
            )));
        }

        self.shares.push(share);
        self.cursor += 1;
        match self.current_hop() {
            Some(to) => Ok(RelayStep::Forward { to, request: self }),
            None => Ok(RelayStep::Complete(self.shares)),
        }
    }
}

impl PartySession {
    /// This party's contribution as the current hop of `req`
    pub fn relay_share(&self, req: &RelayRequest) -> Result<PartialShare> {
        self.check_game(&req.game_id)?;
        if req.current_hop() != Some(self.index) {
            return Err(Error::ProtocolSequence(format!(
                "relay {} delivered to party {} out of turn",
                req.request_id, self.index
            )));
        }
        self.partial_decrypt(&req.ciphertext, req.is_lead_hop())
    }

    /// Requester's closing share: lead only when the chain was empty
    pub fn relay_closing_share(&self, ct: &Ciphertext, chain: &[PartialShare]) -> Result<PartialShare> {
        self.partial_decrypt(ct, chain.is_empty())
    }
}

/// Hand `request` to `to` and wait for the accumulated shares
///
/// A failure reported by a later hop already carries the hop that broke;
/// anything else is blamed on `to`.
pub async fn forward(
    transport: &dyn PeerTransport,
    to: PartyId,
    request: RelayRequest,
) -> Result<Vec<PartialShare>> {
    let request_id = request.request_id;
    match transport.send(to, PeerRequest::RelayStep(request)).await {
        Ok(response) => response.into_shares(),
        Err(e) if e.kind() == ErrorKind::ChainBreak => Err(e),
        Err(e) => {
            warn!(%request_id, party = to, error = %e, "Relay hop failed");
            Err(Error::ChainBreak {
                party: to,
                reason: e.to_string(),
            })
        }
    }
}

/// Requester side: run the whole chain under one overall deadline
#[instrument(skip_all, fields(request_id = %request.request_id))]
pub async fn dispatch(
    transport: &dyn PeerTransport,
    request: RelayRequest,
    overall: Duration,
) -> Result<Vec<PartialShare>> {
    let Some(first) = request.current_hop() else {
        return Ok(Vec::new());
    };
    let hops = request.order.len();
    let request_id = request.request_id;

    let shares = tokio::time::timeout(overall, forward(transport, first, request))
        .await
        .map_err(|_| Error::Timeout(format!("relay chain {}", request_id)))??;

    if shares.len() != hops {
        return Err(Error::InvalidShares(format!(
            "relay chain returned {} shares for {} hops",
            shares.len(),
            hops
        )));
    }
    debug!(hops, "Relay chain returned");
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dkg::setup_sessions;
    use crate::threshold::fuse;
    use rand::rngs::OsRng;

    #[test]
    fn test_order_skips_requester() {
        let sessions = setup_sessions("g", 4);
        let ct = sessions[0].codec().unwrap().zero(4, &mut OsRng);
        let req = RelayRequest::new("g", ct, 2, 4);
        assert_eq!(req.order, vec![0, 1, 3]);
        assert_eq!(req.current_hop(), Some(0));
        assert!(req.is_lead_hop());
    }

    #[test]
    fn test_chain_walk_without_network() {
        let sessions = setup_sessions("g", 4);
        let ct = sessions[0]
            .codec()
            .unwrap()
            .one_hot(4, 3, &mut OsRng)
            .unwrap();

        let mut req = RelayRequest::new("g", ct.clone(), 1, 4);
        let shares = loop {
            let hop = req.current_hop().unwrap();
            let share = sessions[hop].relay_share(&req).unwrap();
            match req.advance(share).unwrap() {
                RelayStep::Forward { to, request } => {
                    assert_eq!(request.current_hop(), Some(to));
                    req = request;
                }
                RelayStep::Complete(shares) => break shares,
            }
        };

        assert_eq!(shares.len(), 3);
        assert_eq!(shares[0].kind, ShareKind::Lead);

        let mut all = shares.clone();
        all.push(sessions[1].relay_closing_share(&ct, &shares).unwrap());
        let plain = fuse(&all, 4, 64).unwrap();
        assert_eq!(plain.values(), &[0, 0, 0, 1]);
    }

    #[test]
    fn test_hop_out_of_turn() {
        let sessions = setup_sessions("g", 3);
        let ct = sessions[0].codec().unwrap().zero(3, &mut OsRng);
        let req = RelayRequest::new("g", ct, 0, 3);

        // party 2 is not the current hop
        let err = sessions[2].relay_share(&req).unwrap_err();
        assert!(matches!(err, Error::ProtocolSequence(_)));

        let wrong = sessions[2].partial_decrypt(&req.ciphertext, true).unwrap();
        assert!(req.advance(wrong).is_err());
    }

    #[test]
    fn test_lead_only_on_first_hop() {
        let sessions = setup_sessions("g", 3);
        let ct = sessions[0].codec().unwrap().zero(3, &mut OsRng);
        let req = RelayRequest::new("g", ct.clone(), 0, 3);

        let main_first = sessions[1].partial_decrypt(&ct, false).unwrap();
        assert!(matches!(
            req.clone().advance(main_first),
            Err(Error::InvalidShares(_))
        ));
    }
}
