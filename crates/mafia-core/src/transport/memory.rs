//! In-memory transport implementation for testing

use super::{PeerRequest, PeerResponse, PeerTransport};
use crate::node::PartyNode;
use crate::{Error, PartyId, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One delivered request, as it would appear on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRecord {
    pub to: PartyId,
    pub bytes: usize,
}

/// Delivers requests to in-process [`PartyNode`]s
///
/// Requests and responses go through a JSON round trip so tests exercise the
/// same encoding as the HTTP transport. Errors come back as
/// [`Error::Remote`], the way a peer service reports them.
#[derive(Default)]
pub struct MemoryTransport {
    nodes: DashMap<PartyId, Weak<PartyNode>>,
    /// Parties that refuse every request
    down: DashMap<PartyId, ()>,
    /// Delivered request sizes by operation
    traffic: DashMap<&'static str, Vec<TrafficRecord>>,
    latency_ms: AtomicU64,
}

fn roundtrip<T: Serialize + DeserializeOwned>(value: &T) -> Result<(T, usize)> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    let value =
        serde_json::from_slice(&bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
    Ok((value, bytes.len()))
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `node` reachable under its own index
    pub fn register(&self, node: &Arc<PartyNode>) {
        self.nodes.insert(node.index(), Arc::downgrade(node));
    }

    /// Simulate a crashed or partitioned party
    pub fn disconnect(&self, party: PartyId) {
        self.down.insert(party, ());
    }

    pub fn reconnect(&self, party: PartyId) {
        self.down.remove(&party);
    }

    /// Delay applied before every delivery
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Requests delivered for `op` so far
    pub fn traffic(&self, op: &str) -> Vec<TrafficRecord> {
        self.traffic
            .get(op)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn clear_traffic(&self) {
        self.traffic.clear();
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn send(&self, to: PartyId, request: PeerRequest) -> Result<PeerResponse> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.down.contains_key(&to) {
            return Err(Error::Transport(format!("party {} unreachable", to)));
        }
        let node = self
            .nodes
            .get(&to)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| Error::Transport(format!("party {} not registered", to)))?;

        let op = request.op();
        let (request, bytes) = roundtrip(&request)?;
        self.traffic
            .entry(op)
            .or_default()
            .push(TrafficRecord { to, bytes });

        match node.handle(request).await {
            Ok(response) => Ok(roundtrip(&response)?.0),
            Err(e) => Err(Error::Remote {
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }
}
