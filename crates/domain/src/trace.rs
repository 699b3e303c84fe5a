use serde::Serialize;

/// Structured trace events emitted across the gateway and node crates.
///
/// Every state transition worth auditing gets a variant here rather than a
/// free-form log line, so the shape is enforced at compile time and the
/// emitted JSON is stable for downstream consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    NodeRegistered {
        node_id: String,
        session_id: String,
        reconnect_count: u32,
    },
    NodeRegistrationRejected {
        node_id: String,
        reason: String,
    },
    NodeSuperseded {
        node_id: String,
        old_session_id: String,
    },
    SessionStateChanged {
        node_id: String,
        session_id: String,
        from: String,
        to: String,
    },
    SessionNoop {
        node_id: String,
        state: String,
        event: String,
    },
    DeviceKeyPinned {
        node_id: String,
    },
    DeviceAuthCircuitOpen {
        node_id: String,
    },
    LaneOverflow {
        node_id: String,
        lane: String,
        dropped_message_id: String,
    },
    LaneAckTimeout {
        node_id: String,
        lane: String,
        message_id: String,
    },
    HeartbeatMissed {
        node_id: String,
        missed_intervals: u32,
    },
    RateLimited {
        node_id: String,
        frames_per_second: u32,
    },
    ReconnectAttempt {
        node_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    ReconnectExhausted {
        node_id: String,
        attempts: u32,
    },
    ConfigReloaded {
        changed_fields: Vec<String>,
    },
    ConversationDegraded {
        requested_scope: String,
        effective_scope: String,
        warnings: Vec<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gateway_event");
    }
}
