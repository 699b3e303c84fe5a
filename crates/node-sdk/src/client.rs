//! Core node client — manages the WebSocket lifecycle, heartbeat response,
//! and lane-message dispatch via [`LaneRegistry`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ag_protocol::{Frame, NodeCapabilities, ProblemDetails};
use chrono::Utc;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::registry::LaneRegistry;
use crate::types::{LaneContext, LaneError, NodeSdkError};

/// A fully-configured node client ready to connect to the gateway.
///
/// Create via [`NodeClientBuilder`](crate::builder::NodeClientBuilder).
pub struct NodeClient {
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

impl NodeClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::NodeClientBuilder {
        crate::builder::NodeClientBuilder::new()
    }

    /// Run the node client. Connects to the gateway, registers, and enters
    /// the frame dispatch loop. On disconnection, automatically reconnects
    /// according to the [`ReconnectBackoff`] policy.
    ///
    /// Returns only on fatal error, `max_attempts` exhaustion, or when the
    /// `shutdown` token is cancelled.
    pub async fn run(
        self,
        registry: LaneRegistry,
        shutdown: CancellationToken,
    ) -> Result<(), NodeSdkError> {
        let registry = Arc::new(registry);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(NodeSdkError::Shutdown);
            }

            let result = tokio::select! {
                r = self.connect_and_run(&registry) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = %self.node_id, "shutdown requested");
                    return Err(NodeSdkError::Shutdown);
                }
            };

            match result {
                Ok(registered) => {
                    tracing::info!(node_id = %self.node_id, registered, "connection closed gracefully");
                    // Only reset backoff after a successful registration, not
                    // merely after TCP connect.
                    if registered {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    if let Some(NodeSdkError::PolicyClose { code, reason }) =
                        e.downcast_ref::<NodeSdkError>()
                    {
                        tracing::error!(
                            node_id = %self.node_id,
                            code,
                            reason = %reason,
                            "connection closed by policy, not reconnecting"
                        );
                        return Err(NodeSdkError::PolicyClose {
                            code: *code,
                            reason: reason.clone(),
                        });
                    }
                    tracing::warn!(node_id = %self.node_id, attempt, error = %e, "connection lost");
                }
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                tracing::error!(node_id = %self.node_id, attempts = attempt, "max reconnect attempts exhausted");
                return Err(NodeSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(
                node_id = %self.node_id,
                delay_ms = delay.as_millis() as u64,
                attempt = attempt + 1,
                "reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    return Err(NodeSdkError::Shutdown);
                }
            }

            attempt += 1;
        }
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle` for embedding
    /// in other runtimes.
    pub fn spawn(
        self,
        registry: LaneRegistry,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), NodeSdkError>> {
        tokio::spawn(async move { self.run(registry, shutdown).await })
    }

    /// Single connection lifecycle: connect -> register -> dispatch loop.
    ///
    /// Returns `Ok(true)` if `node.register.ack` was received before the
    /// connection closed, `Ok(false)` if it closed before that.
    async fn connect_and_run(&self, registry: &Arc<LaneRegistry>) -> Result<bool, anyhow::Error> {
        tracing::info!(url = %self.gateway_ws_url, node_id = %self.node_id, "connecting to gateway");

        let (ws, _response) = tokio_tungstenite::connect_async(&self.gateway_ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        let register = Frame::NodeRegister {
            node_id: self.node_id.clone(),
            capabilities: self.capabilities.clone(),
            token: self.token.clone(),
            signature: self.signature.clone(),
            public_key: self.public_key.clone(),
        };
        sink.send(Message::Text(serde_json::to_string(&register)?))
            .await?;

        let ack_timeout = Duration::from_secs(10);
        let ack = tokio::time::timeout(ack_timeout, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Ok(Frame::NodeRegisterAck { session_id, .. }) =
                        serde_json::from_str(&text)
                    {
                        return Ok(session_id);
                    }
                    if let Ok(Frame::Error { error, .. }) = serde_json::from_str(&text) {
                        return Err(anyhow::anyhow!("registration rejected: {}", error.title));
                    }
                }
            }
            Err(anyhow::anyhow!("connection closed before registration ack"))
        })
        .await;

        let session_id = match ack {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("node.register.ack timeout")),
        };

        tracing::info!(session_id = %session_id, node_id = %self.node_id, "registered with gateway");

        let ws = sink
            .reunite(stream)
            .map_err(|e| anyhow::anyhow!("failed to reunite WebSocket halves: {e}"))?;
        let (mut sink, mut stream) = ws.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);
        let handler_semaphore = Arc::new(Semaphore::new(self.max_concurrent_handlers));
        let inflight_cancel = CancellationToken::new();

        // Heartbeat watchdog: closes the connection if no ping arrives for
        // heartbeat_timeout. The gateway, not the node, drives the cadence.
        let last_ping = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));
        let watchdog_last_ping = last_ping.clone();
        let heartbeat_timeout_ms = self.heartbeat_timeout.as_millis() as i64;
        let watchdog_cancel = CancellationToken::new();
        let watchdog_signal = watchdog_cancel.clone();
        let watchdog_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let elapsed = Utc::now().timestamp_millis() - watchdog_last_ping.load(Ordering::Relaxed);
                if elapsed > heartbeat_timeout_ms {
                    tracing::warn!(elapsed_ms = elapsed, "heartbeat missed, closing connection");
                    watchdog_signal.cancel();
                    break;
                }
            }
        });

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        let session_id_for_loop = session_id.clone();
        let read_loop = async {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    Message::Text(ref text) => {
                        if text.len() > ag_protocol::MAX_FRAME_BYTES {
                            tracing::warn!(bytes = text.len(), "inbound frame exceeds MAX_FRAME_BYTES, dropping");
                            continue;
                        }

                        match serde_json::from_str::<Frame>(text) {
                            Ok(Frame::HeartbeatPing { timestamp }) => {
                                last_ping.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                                let _ = outbound_tx.send(Frame::HeartbeatPong { timestamp }).await;
                            }
                            Ok(Frame::LaneMessage { lane, message }) => {
                                let Some(handler) = registry.get(lane) else {
                                    tracing::warn!(?lane, "no handler registered for lane");
                                    continue;
                                };

                                let tx = outbound_tx.clone();
                                let sem = handler_semaphore.clone();
                                let cancel = inflight_cancel.child_token();
                                let message_id = message.id.clone();
                                let session_id = session_id_for_loop.clone();

                                tokio::spawn(async move {
                                    let _permit = sem.acquire().await;
                                    let ctx = LaneContext {
                                        message_id: message_id.clone(),
                                        lane,
                                        session_id: Some(session_id),
                                        cancel,
                                    };

                                    let call_result = AssertUnwindSafe(handler.handle(ctx, message.payload))
                                        .catch_unwind()
                                        .await;

                                    match call_result {
                                        Ok(Ok(())) => {
                                            let _ = tx.send(Frame::LaneMessageAck { message_id }).await;
                                        }
                                        Ok(Err(e)) => {
                                            tracing::warn!(error = %e, %message_id, "lane handler failed");
                                            let _ = tx
                                                .send(error_frame(&message_id, &e))
                                                .await;
                                        }
                                        Err(_panic) => {
                                            tracing::error!(%message_id, "lane handler panicked");
                                            let _ = tx
                                                .send(error_frame(
                                                    &message_id,
                                                    &LaneError::Failed("handler panicked".into()),
                                                ))
                                                .await;
                                        }
                                    }
                                });
                            }
                            Ok(Frame::SessionUpdate { state, .. }) => {
                                tracing::info!(?state, "session state changed");
                            }
                            Ok(Frame::SessionIdentityUpdate { .. }) => {
                                tracing::debug!("identity context updated");
                            }
                            Ok(Frame::ConfigChanged { fields, .. }) => {
                                tracing::info!(?fields, "gateway config changed");
                            }
                            Ok(Frame::Error { error, .. }) => {
                                tracing::warn!(title = %error.title, detail = ?error.detail, "received error frame");
                            }
                            Ok(_) => {
                                tracing::debug!("ignoring unexpected frame from gateway");
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "failed to parse frame");
                            }
                        }
                    }
                    Message::Close(frame) => {
                        tracing::info!("gateway closed connection");
                        return frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                    }
                    _ => {}
                }
            }
            None
        };

        let close_info = tokio::select! {
            info = read_loop => info,
            _ = watchdog_cancel.cancelled() => None,
        };

        inflight_cancel.cancel();
        watchdog_task.abort();
        writer_task.abort();

        if let Some((code, reason)) = close_info {
            if is_policy_close(code) {
                return Err(NodeSdkError::PolicyClose { code, reason }.into());
            }
        }

        Ok(true)
    }
}

/// WebSocket policy violation (1008) or an application-defined close code in
/// the private-use range — both mean the gateway closed this connection
/// deliberately and retrying immediately would just get closed again.
fn is_policy_close(code: u16) -> bool {
    matches!(code, 1008 | 4000..=4999)
}

fn error_frame(message_id: &str, err: &LaneError) -> Frame {
    Frame::Error {
        request_id: Some(message_id.to_string()),
        error: ProblemDetails::new("about:blank", err.to_string(), 500),
        timestamp: Utc::now().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> NodeClient {
        NodeClient {
            gateway_ws_url: "ws://localhost:3210/v1/nodes/ws".into(),
            node_id: "test-node".into(),
            token: Some("secret".into()),
            signature: None,
            public_key: None,
            capabilities: NodeCapabilities {
                agent_types: vec!["assistant".into()],
                agent_ids: None,
                tools: vec![],
                max_concurrency: 4,
                channels: vec!["whatsapp".into()],
            },
            heartbeat_timeout: Duration::from_secs(90),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_handlers: 16,
        }
    }

    #[test]
    fn error_frame_carries_message_id_and_reason() {
        let frame = error_frame("m-1", &LaneError::Failed("boom".into()));
        match frame {
            Frame::Error { request_id, error, .. } => {
                assert_eq!(request_id.as_deref(), Some("m-1"));
                assert!(error.title.contains("boom"));
            }
            _ => panic!("expected Error frame"),
        }
    }

    #[test]
    fn client_builder_roundtrip() {
        let client = test_client();
        assert_eq!(client.node_id, "test-node");
        assert_eq!(client.capabilities.channels, vec!["whatsapp".to_string()]);
    }
}
