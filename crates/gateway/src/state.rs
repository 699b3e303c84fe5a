use std::sync::Arc;

use ag_auth::DeviceAuth;
use ag_domain::Config;
use ag_sessions::{IdentityResolver, SessionManager};

use crate::api::inbound::DedupeStore;
use crate::nodes::registry::NodeRegistry;

/// Shared state handed to every axum route. Cloning is cheap — every
/// field is an `Arc` or a plain `Option<Vec<u8>>` hash.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub nodes: Arc<NodeRegistry>,
    pub sessions: Arc<SessionManager>,
    pub identity: Arc<IdentityResolver>,
    pub device_auth: Arc<DeviceAuth>,
    pub dedupe: Arc<DedupeStore>,
    /// SHA-256 of the configured legacy token, or `None` if ingress auth is
    /// disabled. Shared by the HTTP inbound endpoint and the WS legacy path.
    pub api_token_hash: Option<Vec<u8>>,
}
