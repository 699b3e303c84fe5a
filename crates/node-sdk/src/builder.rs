//! Builder pattern for constructing a [`NodeClient`].

use std::time::Duration;

use ag_protocol::NodeCapabilities;

use crate::client::NodeClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::NodeSdkError;

/// Fluent builder for [`NodeClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use ag_node_sdk::NodeClientBuilder;
/// # use ag_protocol::NodeCapabilities;
/// let client = NodeClientBuilder::new()
///     .gateway_ws_url("ws://localhost:3210/v1/nodes/ws")
///     .node_id("mac-studio")
///     .token("secret")
///     .capabilities(NodeCapabilities {
///         agent_types: vec!["assistant".into()],
///         agent_ids: None,
///         tools: vec![],
///         max_concurrency: 4,
///         channels: vec!["whatsapp".into()],
///     })
///     .heartbeat_timeout(std::time::Duration::from_secs(90))
///     .build()
///     .unwrap();
/// ```
pub struct NodeClientBuilder {
    pub(crate) gateway_ws_url: String,
    pub(crate) node_id: String,
    pub(crate) token: Option<String>,
    pub(crate) signature: Option<String>,
    pub(crate) public_key: Option<String>,
    pub(crate) capabilities: NodeCapabilities,
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) max_concurrent_handlers: usize,
}

impl NodeClientBuilder {
    pub fn new() -> Self {
        Self {
            gateway_ws_url: "ws://localhost:3210/v1/nodes/ws".into(),
            node_id: "unnamed-node".into(),
            token: None,
            signature: None,
            public_key: None,
            capabilities: NodeCapabilities {
                agent_types: Vec::new(),
                agent_ids: None,
                tools: Vec::new(),
                max_concurrency: 4,
                channels: Vec::new(),
            },
            heartbeat_timeout: Duration::from_secs(90),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_handlers: 16,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Set the gateway WebSocket URL (e.g. `wss://gw.example.com/v1/nodes/ws`).
    pub fn gateway_ws_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_ws_url = url.into();
        self
    }

    /// Set the node's stable unique identifier.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = id.into();
        self
    }

    // ── Credentials (pick one auth mode) ─────────────────────────────

    /// Legacy bearer token credential.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Ed25519 JWT signature plus the base64url-encoded public key,
    /// for TOFU-pinned device auth.
    pub fn ed25519_credential(
        mut self,
        signature: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        self.signature = Some(signature.into());
        self.public_key = Some(public_key.into());
        self
    }

    // ── Capabilities / behavior ──────────────────────────────────────

    pub fn capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// How long to wait with no `heartbeat.ping` before declaring the
    /// connection dead and reconnecting. Should be at least
    /// `2 * healthCheckInterval` to match the gateway's own
    /// `HeartbeatMissed` threshold.
    pub fn heartbeat_timeout(mut self, d: Duration) -> Self {
        self.heartbeat_timeout = d;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Maximum concurrent lane-message handler executions (default 16).
    pub fn max_concurrent_handlers(mut self, n: usize) -> Self {
        self.max_concurrent_handlers = n;
        self
    }

    /// Build the [`NodeClient`].
    pub fn build(self) -> Result<NodeClient, NodeSdkError> {
        if self.gateway_ws_url.is_empty() {
            return Err(NodeSdkError::Config("gateway_ws_url is required".into()));
        }
        if self.token.is_none() && (self.signature.is_none() || self.public_key.is_none()) {
            return Err(NodeSdkError::Config(
                "either token() or ed25519_credential() must be set".into(),
            ));
        }

        Ok(NodeClient {
            gateway_ws_url: self.gateway_ws_url,
            node_id: self.node_id,
            token: self.token,
            signature: self.signature,
            public_key: self.public_key,
            capabilities: self.capabilities,
            heartbeat_timeout: self.heartbeat_timeout,
            reconnect_backoff: self.reconnect_backoff,
            max_concurrent_handlers: self.max_concurrent_handlers,
        })
    }
}

impl Default for NodeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
