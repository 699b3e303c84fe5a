//! Core types for lane-message handling: context, results, and errors.

use ag_protocol::Lane;
use tokio_util::sync::CancellationToken;

/// Context provided to every lane handler invocation.
#[derive(Clone, Debug)]
pub struct LaneContext {
    /// Echoed back in the `lane.message.ack`.
    pub message_id: String,
    /// Which lane this message arrived on.
    pub lane: Lane,
    /// The session this connection was assigned at registration, if the
    /// handshake has completed.
    pub session_id: Option<String>,
    /// Cancelled if the node shuts down while the handler is in flight.
    pub cancel: CancellationToken,
}

/// Result type for lane handlers. `Ok(())` triggers a `lane.message.ack`;
/// `Err` is logged and surfaced as an `error` frame, with no ack sent —
/// the gateway's own ack-timeout bookkeeping decides whether to retry.
pub type LaneResult = Result<(), LaneError>;

/// Errors a lane handler can return.
#[derive(thiserror::Error, Debug, Clone)]
pub enum LaneError {
    #[error("invalid_payload: {0}")]
    InvalidPayload(String),
    #[error("not_allowed: {0}")]
    NotAllowed(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum NodeSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("registration: {0}")]
    Registration(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    /// The gateway closed the socket with a policy-class code (1008, or a
    /// 4xx-range application close) — terminal, must not be retried.
    #[error("connection closed by policy (code {code}): {reason}")]
    PolicyClose { code: u16, reason: String },
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
