//! Reference "hello-world" node for the gateway.
//!
//! Connects over WebSocket, registers with all four lanes handled, and
//! replies to every `lane.message` with an ack (logging the payload).
//!
//! Usage:
//!   AG_NODE_TOKEN=secret ag-demo-node ws://localhost:3210/v1/nodes/ws
//!
//! Env vars:
//!   AG_NODE_TOKEN  — auth token (legacy bearer mode, must match gateway)
//!   AG_NODE_ID     — node ID (default: "demo-node")

use ag_node_sdk::{LaneContext, LaneHandler, LaneRegistry, LaneResult, NodeClientBuilder};
use ag_protocol::{Lane, NodeCapabilities};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct EchoHandler;

#[async_trait::async_trait]
impl LaneHandler for EchoHandler {
    async fn handle(&self, ctx: LaneContext, payload: serde_json::Value) -> LaneResult {
        tracing::info!(message_id = %ctx.message_id, lane = ?ctx.lane, %payload, "handled lane message");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let gateway_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:3210/v1/nodes/ws".into());
    let node_id = std::env::var("AG_NODE_ID").unwrap_or_else(|_| "demo-node".into());
    let token = std::env::var("AG_NODE_TOKEN")
        .map_err(|_| anyhow::anyhow!("AG_NODE_TOKEN must be set"))?;

    let mut registry = LaneRegistry::new();
    registry.register(Lane::Steer, EchoHandler);
    registry.register(Lane::Collect, EchoHandler);
    registry.register(Lane::Followup, EchoHandler);
    registry.register(Lane::Interrupt, EchoHandler);

    let client = NodeClientBuilder::new()
        .gateway_ws_url(gateway_url)
        .node_id(node_id)
        .token(token)
        .capabilities(NodeCapabilities {
            agent_types: vec!["assistant".into()],
            agent_ids: None,
            tools: vec![],
            max_concurrency: 4,
            channels: vec!["demo".into()],
        })
        .build()?;

    client.run(registry, CancellationToken::new()).await?;
    Ok(())
}
