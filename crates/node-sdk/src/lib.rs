//! `ag-node-sdk` — Reusable SDK for building Gateway nodes.
//!
//! A "node" is any process that connects to the Gateway over WebSocket,
//! registers with capabilities, and processes `lane.message` frames. This
//! crate provides connection management, device authentication,
//! registration, heartbeat response, and the lane dispatch loop so node
//! authors only implement [`LaneHandler`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your Node                                                 │
//! │                                                             │
//! │   let mut reg = LaneRegistry::new();                       │
//! │   reg.register(Lane::Steer, SteerHandler);                 │
//! │   reg.register(Lane::Collect, CollectHandler);              │
//! │                                                             │
//! │   NodeClientBuilder::new()                                 │
//! │       .gateway_ws_url("ws://gw:3210/v1/nodes/ws")           │
//! │       .node_id("mac1")                                      │
//! │       .token("secret")                                      │
//! │       .build()?                                             │
//! │       .run(reg, shutdown)                                   │
//! │       .await;                                               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the SDK)
//!
//! 1. Connect WS.
//! 2. Send `node.register { nodeId, capabilities, token | signature+publicKey }`.
//! 3. Wait for `node.register.ack { sessionId }`.
//! 4. Main loop:
//!    - On `heartbeat.ping`: reply `heartbeat.pong` with the echoed timestamp
//!      — never reaches application handlers.
//!    - On `lane.message`: dispatch to the handler registered for that lane,
//!      send `lane.message.ack` on success.
//! 5. On disconnect or missed heartbeat: reconnect with jittered exponential
//!    back-off.

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod registry;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::NodeClientBuilder;
pub use client::NodeClient;
pub use reconnect::ReconnectBackoff;
pub use registry::{LaneHandler, LaneRegistry};
pub use types::{LaneContext, LaneError, LaneResult, NodeSdkError};

// Re-export ag-protocol types so nodes never need to import it directly.
pub use ag_protocol::{Frame, Lane, NodeCapabilities, MAX_FRAME_BYTES};
