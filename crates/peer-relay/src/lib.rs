//! Peer Relay Library
//!
//! Wire conventions shared by the party service and its clients:
//! one route per protocol operation, the JSON error body, and an audit
//! store that keeps protocol milestones for a limited time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mafia_core::{AuditEvent, AuditSink, Error, ErrorKind, PartyId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Event not found: {0}")]
    NotFound(String),
    #[error("Invalid event format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Route table
pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const AUDIT: &str = "/v1/audit";
    /// Operation routes, the last segment is [`mafia_core::PeerRequest::op`]
    pub const PEER: &str = "/v1/peer/:op";
    pub const PEER_PREFIX: &str = "/v1/peer";
}

/// Path serving `op`
pub fn path_for(op: &str) -> String {
    format!("{}/{}", routes::PEER_PREFIX, op)
}

/// JSON body of every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl ErrorBody {
    pub fn from_error(error: &Error) -> Self {
        Self {
            error: error.to_string(),
            kind: error.kind(),
        }
    }

    /// Error as seen by the caller
    pub fn into_error(self) -> Error {
        Error::Remote {
            kind: self.kind,
            message: self.error,
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::ProtocolSequence => 409,
        ErrorKind::CryptoState => 412,
        ErrorKind::DuplicateContribution => 409,
        ErrorKind::ChainBreak => 502,
        ErrorKind::PartialTimeout | ErrorKind::Timeout => 504,
        ErrorKind::InvalidInput | ErrorKind::Serialization => 400,
        ErrorKind::Transport => 503,
        ErrorKind::Internal => 500,
    }
}

/// Stored audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Content hash, hex
    pub id: String,
    /// Arrival order within the store
    pub seq: u64,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub recorded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn event_id(seq: u64, event: &AuditEvent) -> Result<String> {
    let milestone = serde_json::to_string(&event.milestone)
        .map_err(|e| RelayError::InvalidFormat(e.to_string()))?;
    let data = format!("{}:{}:{}:{}", event.game_id, event.party, seq, milestone);
    Ok(hex::encode(blake3::hash(data.as_bytes()).as_bytes()))
}

/// Audit event store
#[derive(Clone)]
pub struct AuditStore {
    /// Events indexed by id
    events: Arc<DashMap<String, StoredEvent>>,
    next_seq: Arc<AtomicU64>,
    /// Retention in seconds
    ttl_seconds: i64,
}

impl AuditStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            events: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            ttl_seconds,
        }
    }

    /// Store an event, returning its id
    pub fn put(&self, event: AuditEvent) -> Result<String> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = event_id(seq, &event)?;
        let now = Utc::now();

        self.events.insert(
            id.clone(),
            StoredEvent {
                id: id.clone(),
                seq,
                event,
                recorded_at: now,
                expires_at: now + chrono::Duration::seconds(self.ttl_seconds),
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<StoredEvent> {
        self.events
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    /// Events of a game, optionally for one party, in arrival order
    pub fn events(&self, game_id: &str, party: Option<PartyId>) -> Vec<StoredEvent> {
        let mut events: Vec<StoredEvent> = self
            .events
            .iter()
            .filter(|entry| {
                entry.event.game_id == game_id && party.map_or(true, |p| entry.event.party == p)
            })
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by_key(|e| e.seq);
        events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove expired events
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.events.retain(|_, v| v.expires_at > now);
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new(3600) // 1 hour default TTL
    }
}

impl AuditSink for AuditStore {
    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.put(event) {
            debug!(error = %e, "Audit event dropped");
        }
    }
}
