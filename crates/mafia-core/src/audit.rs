//! Protocol milestone audit trail
//!
//! Sinks receive milestones only. Roles, targets and decrypted values never
//! appear in an [`AuditEvent`].

use crate::dkg::DkgPhase;
use crate::{GameId, PartyId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol step that completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "milestone", rename_all = "snake_case")]
pub enum Milestone {
    DkgRound { phase: DkgPhase },
    RolesDistributed,
    RoleRevealed,
    RelayCompleted { request_id: Uuid, hops: usize },
    InvestigationCompleted { request_id: Uuid },
    TripleEmitted { turn: u64 },
    DecoysSent { delivered: usize, failed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub game_id: GameId,
    pub party: PartyId,
    #[serde(flatten)]
    pub milestone: Milestone,
}

impl AuditEvent {
    pub fn new(game_id: impl Into<GameId>, party: PartyId, milestone: Milestone) -> Self {
        Self {
            game_id: game_id.into(),
            party,
            milestone,
        }
    }
}

/// Receiver of audit events; `record` must return without blocking
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _event: AuditEvent) {}
}
