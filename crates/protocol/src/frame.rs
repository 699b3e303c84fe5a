use serde::{Deserialize, Serialize};

/// Largest frame the codec will attempt to parse. A pre-parse length check
/// against this bound lets a reader reject oversized input before paying
/// the cost of a full JSON parse.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// The wire protocol frame set. Internally tagged on `kind`; every variant
/// is a struct-like record rather than a wrapped payload type, matching the
/// shape that appears on the wire. Adding a variant here is a breaking
/// change by design — every `match` on `Frame` must be exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Frame {
    #[serde(rename = "node.register")]
    NodeRegister {
        node_id: String,
        capabilities: NodeCapabilities,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_key: Option<String>,
    },

    #[serde(rename = "node.register.ack")]
    NodeRegisterAck { node_id: String, session_id: String },

    #[serde(rename = "node.deregister")]
    NodeDeregister { node_id: String },

    #[serde(rename = "heartbeat.ping")]
    HeartbeatPing { timestamp: i64 },

    #[serde(rename = "heartbeat.pong")]
    HeartbeatPong { timestamp: i64 },

    #[serde(rename = "lane.message")]
    LaneMessage { lane: Lane, message: LaneMessageBody },

    #[serde(rename = "lane.message.ack")]
    LaneMessageAck { message_id: String },

    #[serde(rename = "session.update")]
    SessionUpdate {
        session_id: String,
        node_id: String,
        state: SessionState,
        timestamp: i64,
    },

    #[serde(rename = "session.identity.update")]
    SessionIdentityUpdate {
        session_id: String,
        node_id: String,
        identity: IdentityUpdate,
        timestamp: i64,
    },

    #[serde(rename = "config.changed")]
    ConfigChanged {
        fields: Vec<String>,
        timestamp: i64,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: ProblemDetails,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapabilities {
    pub agent_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<String>>,
    pub tools: Vec<String>,
    pub max_concurrency: u32,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Steer,
    Collect,
    Followup,
    Interrupt,
}

impl Lane {
    /// Lower is higher priority. `Interrupt` has no queue priority — it is
    /// never enqueued — but a numeric value keeps the type total.
    pub fn priority(self) -> u8 {
        match self {
            Lane::Steer => 0,
            Lane::Collect => 1,
            Lane::Followup => 2,
            Lane::Interrupt => u8::MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaneMessageBody {
    pub id: String,
    pub channel_id: String,
    pub payload: serde_json::Value,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_context: Option<RoutingContext>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Dm,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingContext {
    pub agent_id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connected,
    Idle,
    Suspended,
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Connected => "connected",
            SessionState::Idle => "idle",
            SessionState::Suspended => "suspended",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_prefix: Option<String>,
}

/// RFC 7807-shaped problem details carried by `error` frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn new(type_: impl Into<String>, title: impl Into<String>, status: u16) -> Self {
        Self {
            type_: type_.into(),
            title: title.into(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
