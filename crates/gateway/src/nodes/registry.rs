//! Connection registry (C6 bookkeeping). One [`ConnectedNode`] per live
//! WebSocket connection; superseding a `node_id` hands the caller the old
//! entry back so it can cancel that connection's tasks.

use std::collections::HashMap;
use std::sync::Arc;

use ag_lanequeue::LaneQueue;
use ag_protocol::{Frame, NodeCapabilities};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Something the writer task can do to the live socket: forward an
/// application frame, or terminate the connection with a WebSocket close
/// code. Policy closes (heartbeat miss, rate limit, supersede) must reach
/// the peer as an actual Close frame with the right code — not as a
/// `Frame::Error` text message followed by the socket just dropping.
pub enum Outbound {
    Frame(Frame),
    Close { code: u16, reason: String },
}

/// One connected node's live handle. Outbound frames go through
/// `outbound_tx`, drained by that connection's dedicated writer task —
/// a single channel per connection is what gives the supervisor its
/// FIFO ordering guarantee. `lane_queue` is exclusively owned by this
/// node's connection tasks; `lane_notify` wakes the dequeue loop when an
/// HTTP-ingress caller enqueues a message from outside the connection.
pub struct ConnectedNode {
    pub node_id: String,
    pub session_id: Mutex<String>,
    pub capabilities: NodeCapabilities,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Mutex<DateTime<Utc>>,
    pub outbound_tx: mpsc::Sender<Outbound>,
    pub lane_queue: Mutex<LaneQueue>,
    pub lane_notify: Notify,
    pub cancel: CancellationToken,
}

impl ConnectedNode {
    pub fn touch(&self) {
        *self.last_seen.lock() = Utc::now();
    }

    pub fn serves_agent(&self, agent_id: &str) -> bool {
        match &self.capabilities.agent_ids {
            None => true,
            Some(ids) => ids.iter().any(|id| id == agent_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub session_id: String,
    pub agent_types: Vec<String>,
    pub agent_ids: Option<Vec<String>>,
    pub channels: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Exclusively owns the live connection handle for every connected node.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Arc<ConnectedNode>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `node`, returning the previous entry for `node_id` if one
    /// existed — the caller must cancel it to avoid two live connections
    /// for the same node.
    pub fn register(&self, node: Arc<ConnectedNode>) -> Option<Arc<ConnectedNode>> {
        self.nodes.write().insert(node.node_id.clone(), node)
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<ConnectedNode>> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Removes `node_id` only if the current entry is still `expected`
    /// (by pointer) — prevents a stale cleanup task from removing a node
    /// that has since reconnected under the same id.
    pub fn remove_if_current(&self, node_id: &str, expected: &Arc<ConnectedNode>) {
        let mut nodes = self.nodes.write();
        if let Some(current) = nodes.get(node_id) {
            if Arc::ptr_eq(current, expected) {
                nodes.remove(node_id);
            }
        }
    }

    pub fn touch(&self, node_id: &str) {
        if let Some(node) = self.nodes.read().get(node_id) {
            node.touch();
        }
    }

    pub fn list(&self) -> Vec<NodeSummary> {
        self.nodes
            .read()
            .values()
            .map(|n| NodeSummary {
                node_id: n.node_id.clone(),
                session_id: n.session_id.lock().clone(),
                agent_types: n.capabilities.agent_types.clone(),
                agent_ids: n.capabilities.agent_ids.clone(),
                channels: n.capabilities.channels.clone(),
                connected_at: n.connected_at,
                last_seen: *n.last_seen.lock(),
            })
            .collect()
    }

    /// First connected node (in registry iteration order) whose
    /// capabilities admit `agent_id`.
    pub fn find_for_agent(&self, agent_id: &str) -> Option<Arc<ConnectedNode>> {
        self.nodes
            .read()
            .values()
            .find(|n| n.serves_agent(agent_id))
            .cloned()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, agent_ids: Option<Vec<String>>) -> Arc<ConnectedNode> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ConnectedNode {
            node_id: id.into(),
            session_id: Mutex::new("s1".into()),
            capabilities: NodeCapabilities {
                agent_types: vec!["assistant".into()],
                agent_ids,
                tools: vec![],
                max_concurrency: 1,
                channels: vec!["demo".into()],
            },
            connected_at: Utc::now(),
            last_seen: Mutex::new(Utc::now()),
            outbound_tx: tx,
            lane_queue: Mutex::new(LaneQueue::new(256)),
            lane_notify: Notify::new(),
            cancel: CancellationToken::new(),
        })
    }

    #[test]
    fn register_returns_previous_entry() {
        let registry = NodeRegistry::new();
        let first = node("n1", None);
        assert!(registry.register(first.clone()).is_none());
        let second = node("n1", None);
        let prev = registry.register(second).unwrap();
        assert!(Arc::ptr_eq(&prev, &first));
    }

    #[test]
    fn find_for_agent_honors_restriction() {
        let registry = NodeRegistry::new();
        registry.register(node("n1", Some(vec!["billing-bot".into()])));
        assert!(registry.find_for_agent("billing-bot").is_some());
        assert!(registry.find_for_agent("support-bot").is_none());
    }

    #[test]
    fn unrestricted_node_serves_any_agent() {
        let registry = NodeRegistry::new();
        registry.register(node("n1", None));
        assert!(registry.find_for_agent("anything").is_some());
    }

    #[test]
    fn remove_if_current_skips_stale_handle() {
        let registry = NodeRegistry::new();
        let first = node("n1", None);
        registry.register(first.clone());
        let second = node("n1", None);
        registry.register(second.clone());
        registry.remove_if_current("n1", &first);
        assert!(registry.get("n1").is_some());
        registry.remove_if_current("n1", &second);
        assert!(registry.get("n1").is_none());
    }
}
