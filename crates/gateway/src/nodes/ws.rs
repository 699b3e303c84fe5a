//! Connection Supervisor (C6): one logical session per connected node.
//!
//! Flow:
//! 1. Node connects to `/v1/nodes/ws?nodeId=<id>` and sends `node.register`
//!    carrying its capabilities plus either a legacy `token` or an
//!    `signature`/`publicKey` pair.
//! 2. The frame is validated (C1), the credential is checked (C2), and the
//!    Session Manager (C3) records the registration.
//! 3. On success the gateway replies `node.register.ack`; a writer task and
//!    the main dispatch loop start. `heartbeat.ping` is driven by the
//!    gateway, never the node; a `lane.message` is delivered whenever the
//!    node's [`LaneQueue`](ag_lanequeue::LaneQueue) has something dequeued.
//! 4. On disconnect, missed heartbeats, or a rate-limit breach, the
//!    connection closes and the node is removed from the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ag_auth::RegisterCredential;
use ag_domain::TraceEvent;
use ag_protocol::{Frame, ProblemDetails};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::nodes::registry::{ConnectedNode, Outbound};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub node_id: Option<String>,
}

/// GET /v1/nodes/ws — upgrade to the node control-plane WebSocket.
pub async fn node_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(_query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let Some(register_frame) = wait_for_register(&mut stream).await else {
        tracing::debug!("connection closed before node.register");
        return;
    };

    if let Err(e) = register_frame.validate() {
        let _ = send_frame(&mut sink, &rejection_frame(e.to_string())).await;
        return;
    }

    let Frame::NodeRegister {
        node_id,
        capabilities,
        token,
        signature,
        public_key,
    } = register_frame
    else {
        unreachable!("wait_for_register only yields NodeRegister");
    };

    let now = Utc::now();
    let outcome = state.device_auth.verify(
        RegisterCredential {
            node_id: &node_id,
            token: token.as_deref(),
            signature: signature.as_deref(),
            public_key_b64: public_key.as_deref(),
        },
        now.timestamp(),
    );

    if !outcome.valid {
        TraceEvent::NodeRegistrationRejected {
            node_id: node_id.clone(),
            reason: outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "rejected".into()),
        }
        .emit();
        let _ = send_frame(&mut sink, &rejection_frame(ag_auth::GENERIC_REJECTION_DETAIL.to_string())).await;
        return;
    }

    let register_outcome = state.sessions.register(&node_id, now);
    let session_id = register_outcome.session.session_id.clone();

    if register_outcome.superseded_session_id.is_some() {
        if let Some(old) = state.nodes.get(&node_id) {
            old.cancel.cancel();
        }
    }

    if send_frame(
        &mut sink,
        &Frame::NodeRegisterAck {
            node_id: node_id.clone(),
            session_id: session_id.clone(),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(64);
    let connected = Arc::new(ConnectedNode {
        node_id: node_id.clone(),
        session_id: Mutex::new(session_id.clone()),
        capabilities,
        connected_at: now,
        last_seen: Mutex::new(now),
        outbound_tx: outbound_tx.clone(),
        lane_queue: Mutex::new(ag_lanequeue::LaneQueue::new(state.config.lanes.lane_capacity)),
        lane_notify: tokio::sync::Notify::new(),
        cancel: CancellationToken::new(),
    });
    state.nodes.register(connected.clone());

    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    run_dispatch_loop(&state, &connected, &mut stream).await;

    writer.abort();
    state.nodes.remove_if_current(&node_id, &connected);

    // Only disconnect the session if it's still the one this connection
    // minted — a reconnecting node registers its new session *before* this
    // (superseded) connection's cleanup runs, so disconnecting
    // unconditionally would tear down the fresh session instead of this
    // stale one.
    let still_current = state
        .sessions
        .get(&node_id)
        .is_some_and(|s| s.session_id == session_id);
    if still_current {
        state.sessions.disconnect(&node_id);
    }
    tracing::info!(node_id = %node_id, "node disconnected");
}

async fn run_dispatch_loop(
    state: &AppState,
    node: &Arc<ConnectedNode>,
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) {
    let heartbeat_interval = Duration::from_secs(state.config.sessions.health_check_interval_secs);
    let mut heartbeat_tick = tokio::time::interval(heartbeat_interval);
    let mut session_tick = tokio::time::interval(Duration::from_secs(5));
    let mut missed_heartbeats: u32 = 0;
    let mut pong_since_ping = true;
    let mut frame_window_start = Instant::now();
    let mut frames_in_window: u32 = 0;
    let max_frames_per_second = state.config.rate_limit.max_frames_per_second;

    loop {
        tokio::select! {
            biased;

            _ = node.cancel.cancelled() => {
                TraceEvent::NodeSuperseded {
                    node_id: node.node_id.clone(),
                    old_session_id: node.session_id.lock().clone(),
                }.emit();
                let _ = node.outbound_tx.try_send(policy_close("superseded by a newer connection"));
                return;
            }

            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { return };

                if Instant::now().duration_since(frame_window_start) >= Duration::from_secs(1) {
                    frame_window_start = Instant::now();
                    frames_in_window = 0;
                }
                frames_in_window += 1;
                if frames_in_window > max_frames_per_second {
                    TraceEvent::RateLimited {
                        node_id: node.node_id.clone(),
                        frames_per_second: max_frames_per_second,
                    }.emit();
                    let _ = node.outbound_tx.send(policy_close("rate limit exceeded")).await;
                    return;
                }

                match msg {
                    Message::Text(text) => {
                        handle_inbound_text(state, node, &text, &mut pong_since_ping).await;
                    }
                    Message::Close(_) => return,
                    Message::Ping(_) | Message::Pong(_) => node.touch(),
                    _ => {}
                }
            }

            _ = heartbeat_tick.tick() => {
                if !pong_since_ping {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        TraceEvent::HeartbeatMissed {
                            node_id: node.node_id.clone(),
                            missed_intervals: missed_heartbeats,
                        }.emit();
                        let _ = node.outbound_tx.send(policy_close("heartbeat missed")).await;
                        return;
                    }
                } else {
                    missed_heartbeats = 0;
                }
                pong_since_ping = false;
                let ping = Frame::HeartbeatPing { timestamp: Utc::now().timestamp_millis() };
                if node.outbound_tx.send(Outbound::Frame(ping)).await.is_err() {
                    return;
                }
            }

            _ = node.lane_notify.notified() => {
                drain_lane_queue(node).await;
            }

            _ = session_tick.tick() => {
                if let Some(session) = state.sessions.check_timers(&node.node_id, Utc::now()) {
                    let update = Frame::SessionUpdate {
                        session_id: session.session_id.clone(),
                        node_id: node.node_id.clone(),
                        state: session.state,
                        timestamp: Utc::now().timestamp_millis(),
                    };
                    let _ = node.outbound_tx.send(Outbound::Frame(update)).await;
                }
                check_overdue_acks(node, state.config.lanes.lane_ack_timeout_ms);
            }
        }
    }
}

async fn handle_inbound_text(
    state: &AppState,
    node: &Arc<ConnectedNode>,
    text: &str,
    pong_since_ping: &mut bool,
) {
    node.touch();
    let Ok(frame) = serde_json::from_str::<Frame>(text) else {
        let _ = node
            .outbound_tx
            .send(Outbound::Frame(rejection_frame_visible("malformed frame")))
            .await;
        return;
    };
    if frame.validate().is_err() {
        let _ = node
            .outbound_tx
            .send(Outbound::Frame(rejection_frame_visible("frame failed validation")))
            .await;
        return;
    }

    match frame {
        Frame::HeartbeatPong { .. } => {
            *pong_since_ping = true;
            state.sessions.record_activity(&node.node_id, Utc::now());
        }
        Frame::HeartbeatPing { timestamp } => {
            let _ = node
                .outbound_tx
                .send(Outbound::Frame(Frame::HeartbeatPong { timestamp }))
                .await;
        }
        Frame::LaneMessageAck { message_id } => {
            node.lane_queue.lock().ack(&message_id);
            state.sessions.record_activity(&node.node_id, Utc::now());
        }
        Frame::NodeDeregister { .. } => {
            node.cancel.cancel();
        }
        _ => {
            tracing::debug!(node_id = %node.node_id, "ignoring frame with no supervisor-side handler");
        }
    }
}

/// Dequeues every ready message and pushes it out as `lane.message`.
/// Called whenever `lane_notify` fires (HTTP ingress enqueued something).
async fn drain_lane_queue(node: &Arc<ConnectedNode>) {
    loop {
        let next = node.lane_queue.lock().dequeue(Instant::now());
        let Some((lane, message)) = next else { break };
        let frame = Frame::LaneMessage { lane, message };
        if node.outbound_tx.send(Outbound::Frame(frame)).await.is_err() {
            break;
        }
    }
}

fn check_overdue_acks(node: &Arc<ConnectedNode>, timeout_ms: u64) {
    let overdue = node
        .lane_queue
        .lock()
        .overdue_acks(Duration::from_millis(timeout_ms), Instant::now());
    for message_id in overdue {
        TraceEvent::LaneAckTimeout {
            node_id: node.node_id.clone(),
            lane: "unknown".into(),
            message_id,
        }
        .emit();
    }
}

async fn wait_for_register(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<Frame> {
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(frame @ Frame::NodeRegister { .. }) = serde_json::from_str::<Frame>(&text) {
                    return Some(frame);
                }
            }
        }
        None
    })
    .await;
    result.unwrap_or(None)
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &Frame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

fn rejection_frame(detail: String) -> Frame {
    Frame::Error {
        request_id: None,
        error: ProblemDetails::new("about:blank", "registration rejected", 400).with_detail(detail),
        timestamp: Utc::now().timestamp_millis(),
    }
}

fn rejection_frame_visible(detail: &str) -> Frame {
    Frame::Error {
        request_id: None,
        error: ProblemDetails::new("about:blank", "frame rejected", 400).with_detail(detail),
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// Policy closes (heartbeat miss, rate limit, supersede) terminate the
/// socket with an actual WebSocket Close frame carrying code 1008, not an
/// application-level `Frame::Error` — the node needs this to distinguish a
/// deliberate policy close from an abnormal 1006 drop and treat it as
/// terminal instead of retrying immediately.
fn policy_close(reason: &str) -> Outbound {
    Outbound::Close {
        code: 1008,
        reason: reason.to_string(),
    }
}
