//! Inbound channel contract — the normalized envelope that connectors post.
//!
//! `POST /v1/inbound` accepts a message from any channel (Discord, Telegram,
//! WhatsApp, CLI, etc.), resolves it to a conversation key and a target
//! agent via the conversation router and bindings, finds the node currently
//! serving that agent, and enqueues the message onto that node's lane
//! queue. This is the single entry point for all channel connectors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ag_domain::config::{resolve_binding, ConversationScope as ConfigScope};
use ag_domain::TraceEvent;
use ag_lanequeue::EnqueueOutcome;
use ag_protocol::{Frame, Lane, LaneMessageBody, ProblemDetails, RoutingContext as WireRoutingContext};
use ag_sessions::{
    resolve_conversation_key, ConversationKeyError, ConversationScope, MessageType, RoutingContext,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::nodes::registry::Outbound;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dedupe store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory idempotency store. Tracks seen request ids with a TTL so a
/// connector's retries don't enqueue the same message twice.
pub struct DedupeStore {
    seen: parking_lot::Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: parking_lot::Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns `true` if this id was already seen (duplicate).
    pub fn check_and_insert(&self, id: &str) -> bool {
        let mut map = self.seen.lock();
        let now = Instant::now();

        if map.len() > 10_000 {
            map.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        if let Some(ts) = map.get(id) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }

        map.insert(id.to_string(), now);
        false
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalized inbound envelope a connector posts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub channel: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub peer_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    /// Idempotency key, e.g. `"{channel}:{account_id}:{message_id}"`.
    #[serde(default)]
    pub event_id: Option<String>,
    pub text: String,
    /// Explicit target agent; overrides binding resolution when present.
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deduped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn accepted(conversation_key: String, node_id: String) -> axum::response::Response {
    Json(InboundResponse {
        accepted: true,
        deduped: false,
        conversation_key: Some(conversation_key),
        node_id: Some(node_id),
        error: None,
    })
    .into_response()
}

fn rejected(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(InboundResponse {
            accepted: false,
            deduped: false,
            conversation_key: None,
            node_id: None,
            error: Some(error.into()),
        }),
    )
        .into_response()
}

fn map_scope(scope: ConfigScope) -> ConversationScope {
    match scope {
        ConfigScope::Main => ConversationScope::Main,
        ConfigScope::PerPeer => ConversationScope::PerPeer,
        ConfigScope::PerChannelPeer => ConversationScope::PerChannelPeer,
        ConfigScope::PerAccountChannelPeer => ConversationScope::PerAccountChannelPeer,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn inbound(
    State(state): State<AppState>,
    Json(body): Json<InboundEnvelope>,
) -> impl IntoResponse {
    if let Some(event_id) = &body.event_id {
        if state.dedupe.check_and_insert(event_id) {
            return Json(InboundResponse {
                accepted: true,
                deduped: true,
                conversation_key: None,
                node_id: None,
                error: None,
            })
            .into_response();
        }
    }

    let binding = resolve_binding(
        &state.config.router.bindings,
        Some(body.channel.as_str()),
        body.account_id.as_deref(),
        Some(body.peer_id.as_str()),
    );

    let agent_id = match body
        .agent_id
        .clone()
        .or_else(|| binding.map(|b| b.agent_id.clone()))
    {
        Some(id) => id,
        None => {
            return rejected(
                StatusCode::BAD_REQUEST,
                "no binding matched this message and no agentId was given",
            )
        }
    };

    let routing = RoutingContext {
        scope: map_scope(state.config.router.default_conversation_scope),
        agent_id: &agent_id,
        channel_id: &body.channel,
        peer_id: Some(&body.peer_id),
        account_id: body.account_id.as_deref(),
        group_id: body.group_id.as_deref(),
        message_type: if body.group_id.is_some() {
            MessageType::Group
        } else {
            MessageType::Dm
        },
    };

    let resolved = match resolve_conversation_key(&routing) {
        Ok(r) => r,
        Err(e) => {
            let status = match e {
                ConversationKeyError::ColonInField(_)
                | ConversationKeyError::MissingGroupId
                | ConversationKeyError::MissingPeerId(_) => StatusCode::BAD_REQUEST,
            };
            return rejected(status, e.to_string());
        }
    };

    let node = match state.nodes.find_for_agent(&agent_id) {
        Some(n) => n,
        None => {
            return rejected(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("no node currently serving agentId {agent_id}"),
            )
        }
    };

    let message = LaneMessageBody {
        id: uuid::Uuid::new_v4().to_string(),
        channel_id: resolved.key.clone(),
        payload: serde_json::json!({
            "channel": body.channel,
            "accountId": body.account_id,
            "peerId": body.peer_id,
            "groupId": body.group_id,
            "text": body.text,
        }),
        timestamp: Utc::now().timestamp_millis(),
        routing_context: Some(WireRoutingContext {
            agent_id: agent_id.clone(),
            channel_id: body.channel.clone(),
            peer_id: Some(body.peer_id.clone()),
            account_id: body.account_id.clone(),
            group_id: body.group_id.clone(),
            message_type: Some(if body.group_id.is_some() {
                ag_protocol::MessageType::Group
            } else {
                ag_protocol::MessageType::Dm
            }),
        }),
    };

    let outcome = node.lane_queue.lock().enqueue(Lane::Collect, message);
    node.lane_notify.notify_one();

    match outcome {
        EnqueueOutcome::Queued | EnqueueOutcome::DeliverInline => {
            accepted(resolved.key, node.node_id.clone())
        }
        EnqueueOutcome::QueuedWithEviction { evicted_id } => {
            tracing::warn!(node_id = %node.node_id, evicted_id = %evicted_id, "lane queue full, evicted oldest message");
            TraceEvent::LaneOverflow {
                node_id: node.node_id.clone(),
                lane: "collect".into(),
                dropped_message_id: evicted_id.clone(),
            }
            .emit();
            let overflow_frame = Frame::Error {
                request_id: Some(evicted_id.clone()),
                error: ProblemDetails::new("about:blank", "lane overflow", 507)
                    .with_detail(format!("message {evicted_id} evicted from a full lane")),
                timestamp: Utc::now().timestamp_millis(),
            };
            let _ = node
                .outbound_tx
                .send(Outbound::Frame(overflow_frame))
                .await;
            accepted(resolved.key, node.node_id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_store_rejects_duplicate() {
        let store = DedupeStore::new(Duration::from_secs(60));
        assert!(!store.check_and_insert("evt1"));
        assert!(store.check_and_insert("evt1"));
        assert!(!store.check_and_insert("evt2"));
    }

    #[test]
    fn dedupe_store_expires() {
        let store = DedupeStore::new(Duration::from_millis(0));
        assert!(!store.check_and_insert("evt1"));
        std::thread::sleep(Duration::from_millis(1));
        assert!(!store.check_and_insert("evt1"));
    }

    #[test]
    fn response_omits_none_fields() {
        let resp = InboundResponse {
            accepted: true,
            deduped: false,
            conversation_key: None,
            node_id: None,
            error: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("deduped").is_none());
        assert!(json.get("conversationKey").is_none());
        assert!(json.get("nodeId").is_none());
        assert!(json.get("error").is_none());
    }
}
