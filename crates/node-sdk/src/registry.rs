//! Lane registry — maps each lane to the handler that processes its messages.

use std::collections::HashMap;
use std::sync::Arc;

use ag_protocol::Lane;

use crate::types::{LaneContext, LaneResult};

/// Implement this trait to process `lane.message` frames delivered to a
/// specific lane.
///
/// The SDK dispatches every inbound message to the handler registered for
/// its lane. `interrupt`-lane messages bypass the gateway's queue entirely
/// but still reach the node through the same dispatch path and the same
/// trait.
///
/// # Example
///
/// ```rust,no_run
/// use ag_node_sdk::{LaneHandler, LaneContext, LaneResult};
///
/// struct SteerHandler;
///
/// #[async_trait::async_trait]
/// impl LaneHandler for SteerHandler {
///     async fn handle(&self, _ctx: LaneContext, _payload: serde_json::Value) -> LaneResult {
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait LaneHandler: Send + Sync + 'static {
    /// Process one lane message's payload.
    async fn handle(&self, ctx: LaneContext, payload: serde_json::Value) -> LaneResult;
}

/// Registry of lane handlers, one slot per [`Lane`] variant.
///
/// # Usage
///
/// ```rust,no_run
/// # use ag_node_sdk::LaneRegistry;
/// let mut reg = LaneRegistry::new();
/// // reg.register(ag_protocol::Lane::Steer, SteerHandler);
/// ```
#[derive(Clone, Default)]
pub struct LaneRegistry {
    handlers: HashMap<Lane, Arc<dyn LaneHandler>>,
}

impl LaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a lane. Registering twice for the same
    /// lane replaces the previous handler.
    pub fn register(&mut self, lane: Lane, handler: impl LaneHandler) {
        self.handlers.insert(lane, Arc::new(handler));
    }

    /// Lanes with a registered handler.
    pub fn lanes(&self) -> Vec<Lane> {
        let mut lanes: Vec<Lane> = self.handlers.keys().copied().collect();
        lanes.sort_by_key(|l| l.priority());
        lanes
    }

    pub(crate) fn get(&self, lane: Lane) -> Option<Arc<dyn LaneHandler>> {
        self.handlers.get(&lane).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LaneError;
    use tokio_util::sync::CancellationToken;

    struct Echo;
    #[async_trait::async_trait]
    impl LaneHandler for Echo {
        async fn handle(&self, _ctx: LaneContext, _payload: serde_json::Value) -> LaneResult {
            Ok(())
        }
    }

    struct Fail;
    #[async_trait::async_trait]
    impl LaneHandler for Fail {
        async fn handle(&self, _ctx: LaneContext, _payload: serde_json::Value) -> LaneResult {
            Err(LaneError::Failed("intentional".into()))
        }
    }

    fn test_ctx(lane: Lane) -> LaneContext {
        LaneContext {
            message_id: "m-1".into(),
            lane,
            session_id: None,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = LaneRegistry::new();
        reg.register(Lane::Steer, Echo);
        assert!(reg.get(Lane::Steer).is_some());
        assert!(reg.get(Lane::Collect).is_none());
    }

    #[test]
    fn lanes_sorted_by_priority() {
        let mut reg = LaneRegistry::new();
        reg.register(Lane::Followup, Echo);
        reg.register(Lane::Steer, Echo);
        reg.register(Lane::Collect, Echo);
        assert_eq!(reg.lanes(), vec![Lane::Steer, Lane::Collect, Lane::Followup]);
    }

    #[tokio::test]
    async fn echo_handler_succeeds() {
        let mut reg = LaneRegistry::new();
        reg.register(Lane::Steer, Echo);
        let handler = reg.get(Lane::Steer).unwrap();
        let result = handler
            .handle(test_ctx(Lane::Steer), serde_json::json!({"x": 1}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fail_handler_returns_error() {
        let mut reg = LaneRegistry::new();
        reg.register(Lane::Collect, Fail);
        let handler = reg.get(Lane::Collect).unwrap();
        let result = handler
            .handle(test_ctx(Lane::Collect), serde_json::json!({}))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("intentional"));
    }
}
