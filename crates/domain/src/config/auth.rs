use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which credential a node must present at `node.register`. Restart-required
/// — switching modes mid-flight would strand connections authenticated
/// under the old mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Bearer token only.
    Legacy,
    /// Ed25519-signed JWT only.
    Ed25519,
    /// Either bearer token or signature is accepted.
    Dual,
}

impl Default for AuthMode {
    fn default() -> Self {
        AuthMode::Dual
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Legacy bearer token expected on `node.register` / HTTP ingress.
    /// `None` disables legacy auth (dev mode if `mode` also permits it).
    #[serde(default)]
    pub legacy_token: Option<String>,

    /// Trust-On-First-Use: pin a device's public key the first time it
    /// presents one, instead of requiring it to be pre-known.
    #[serde(default = "d_allow_tofu")]
    pub allow_tofu: bool,

    /// Upper bound on the device key registry. TOFU installs are refused
    /// once this is reached.
    #[serde(default = "d_max_device_keys")]
    pub max_device_keys: usize,

    /// Maximum age, in seconds, of a JWT's `exp` claim relative to now.
    #[serde(default = "d_jwt_max_age_secs")]
    pub jwt_max_age_secs: i64,

    /// Pre-known `nodeId -> base64url publicKey` pairs, loaded at startup.
    #[serde(default)]
    pub known_keys: Vec<KnownKey>,

    /// Consecutive-failure cooldown window for the auth circuit breaker,
    /// in seconds.
    #[serde(default = "d_circuit_cooldown_secs")]
    pub circuit_cooldown_secs: u64,

    /// Consecutive failures before the circuit opens for a node.
    #[serde(default = "d_circuit_threshold")]
    pub circuit_failure_threshold: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            legacy_token: None,
            allow_tofu: d_allow_tofu(),
            max_device_keys: d_max_device_keys(),
            jwt_max_age_secs: d_jwt_max_age_secs(),
            known_keys: Vec::new(),
            circuit_cooldown_secs: d_circuit_cooldown_secs(),
            circuit_failure_threshold: d_circuit_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownKey {
    pub node_id: String,
    /// Base64url-encoded Ed25519 public key.
    pub public_key: String,
}

/// Non-functional placeholders for the back-office API client ("Nexus").
/// The client itself is out of scope; these fields exist only because the
/// configuration surface names them as restart-required.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NexusConfig {
    #[serde(default)]
    pub nexus_url: Option<String>,
    #[serde(default)]
    pub nexus_api_key: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_allow_tofu() -> bool {
    false
}
fn d_max_device_keys() -> usize {
    10_000
}
fn d_jwt_max_age_secs() -> i64 {
    300
}
fn d_circuit_cooldown_secs() -> u64 {
    30
}
fn d_circuit_threshold() -> u32 {
    5
}
