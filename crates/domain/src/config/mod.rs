mod auth;
mod lanes;
mod router;
mod server;
mod sessions;

pub use auth::{AuthConfig, AuthMode, KnownKey, NexusConfig};
pub use lanes::{LaneConfig, RateLimitConfig};
pub use router::{resolve_binding, Binding, BindingMatch, ConversationScope, RouterConfig};
pub use server::{CorsConfig, ServerConfig};
pub use sessions::SessionConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub nexus: NexusConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub lanes: LaneConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl Config {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| crate::error::Error::Configuration(e.to_string()))?;
        let issues = config.validate();
        if let Some(first) = issues.iter().find(|i| i.severity == ConfigSeverity::Error) {
            return Err(crate::error::Error::Configuration(first.to_string()));
        }
        for issue in issues.iter().filter(|i| i.severity == ConfigSeverity::Warning) {
            tracing::warn!(%issue, "configuration warning");
        }
        Ok(config)
    }

    /// Validates the whole config and returns every issue found — never
    /// stops at the first one, so a misconfigured deployment sees the
    /// complete list on a single failed start.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigError::error("server.port", "port must not be 0"));
        }
        if self.server.host.trim().is_empty() {
            issues.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_connections == 0 {
            issues.push(ConfigError::error(
                "server.max_connections",
                "max_connections must be greater than 0",
            ));
        }

        if self.auth.max_device_keys == 0 {
            issues.push(ConfigError::error(
                "auth.max_device_keys",
                "max_device_keys must be greater than 0",
            ));
        }
        if self.auth.jwt_max_age_secs <= 0 {
            issues.push(ConfigError::error(
                "auth.jwt_max_age_secs",
                "jwt_max_age_secs must be greater than 0",
            ));
        }
        if matches!(self.auth.mode, AuthMode::Legacy | AuthMode::Dual)
            && self.auth.legacy_token.as_deref().unwrap_or("").is_empty()
        {
            issues.push(ConfigError::warning(
                "auth.legacy_token",
                "auth mode accepts legacy bearer tokens but none is configured",
            ));
        }
        {
            let mut seen = HashSet::new();
            for key in &self.auth.known_keys {
                if key.node_id.trim().is_empty() {
                    issues.push(ConfigError::error(
                        "auth.known_keys[].node_id",
                        "node_id must not be empty",
                    ));
                }
                if key.public_key.trim().is_empty() {
                    issues.push(ConfigError::error(
                        "auth.known_keys[].public_key",
                        "public_key must not be empty",
                    ));
                }
                if !seen.insert(key.node_id.as_str()) {
                    issues.push(ConfigError::error(
                        "auth.known_keys[].node_id",
                        format!("duplicate known key for node_id '{}'", key.node_id),
                    ));
                }
            }
        }

        if self.sessions.session_timeout_secs == 0 {
            issues.push(ConfigError::error(
                "sessions.session_timeout_secs",
                "session_timeout_secs must be greater than 0",
            ));
        }
        if self.sessions.suspend_timeout_secs == 0 {
            issues.push(ConfigError::error(
                "sessions.suspend_timeout_secs",
                "suspend_timeout_secs must be greater than 0",
            ));
        }
        if self.sessions.health_check_interval_secs == 0 {
            issues.push(ConfigError::error(
                "sessions.health_check_interval_secs",
                "health_check_interval_secs must be greater than 0",
            ));
        }

        if self.lanes.lane_capacity == 0 {
            issues.push(ConfigError::error(
                "lanes.lane_capacity",
                "lane_capacity must be greater than 0",
            ));
        }
        if self.lanes.lane_ack_timeout_ms == 0 {
            issues.push(ConfigError::error(
                "lanes.lane_ack_timeout_ms",
                "lane_ack_timeout_ms must be greater than 0",
            ));
        }
        if self.rate_limit.max_frames_per_second == 0 {
            issues.push(ConfigError::error(
                "rate_limit.max_frames_per_second",
                "max_frames_per_second must be greater than 0",
            ));
        }

        if self.router.max_conversations == 0 {
            issues.push(ConfigError::error(
                "router.max_conversations",
                "max_conversations must be greater than 0",
            ));
        }
        {
            let mut seen = HashSet::new();
            for (idx, binding) in self.router.bindings.iter().enumerate() {
                if binding.agent_id.trim().is_empty() {
                    issues.push(ConfigError::error(
                        format!("router.bindings[{idx}].agent_id"),
                        "agent_id must not be empty",
                    ));
                }
                let key = (
                    binding.match_.channel.clone(),
                    binding.match_.account_id.clone(),
                    binding.match_.peer_id.clone(),
                );
                if !seen.insert(key) {
                    issues.push(ConfigError::warning(
                        format!("router.bindings[{idx}]"),
                        "duplicate match pattern shadows an earlier binding",
                    ));
                }
            }
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARNING",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|i| i.field == field)
    }

    #[test]
    fn default_config_is_valid() {
        let issues = valid_config().validate();
        assert!(
            issues.iter().all(|i| i.severity == ConfigSeverity::Warning),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn zero_port_is_error() {
        let mut c = valid_config();
        c.server.port = 0;
        let issues = c.validate();
        assert!(find_issue(&issues, "server.port").is_some());
    }

    #[test]
    fn empty_host_is_error() {
        let mut c = valid_config();
        c.server.host = "".into();
        let issues = c.validate();
        assert!(find_issue(&issues, "server.host").is_some());
    }

    #[test]
    fn zero_lane_capacity_is_error() {
        let mut c = valid_config();
        c.lanes.lane_capacity = 0;
        let issues = c.validate();
        assert!(find_issue(&issues, "lanes.lane_capacity").is_some());
    }

    #[test]
    fn zero_jwt_max_age_is_error() {
        let mut c = valid_config();
        c.auth.jwt_max_age_secs = 0;
        let issues = c.validate();
        assert!(find_issue(&issues, "auth.jwt_max_age_secs").is_some());
    }

    #[test]
    fn duplicate_known_key_is_error() {
        let mut c = valid_config();
        c.auth.known_keys.push(KnownKey {
            node_id: "n1".into(),
            public_key: "aaaa".into(),
        });
        c.auth.known_keys.push(KnownKey {
            node_id: "n1".into(),
            public_key: "bbbb".into(),
        });
        let issues = c.validate();
        assert!(find_issue(&issues, "auth.known_keys[].node_id").is_some());
    }

    #[test]
    fn duplicate_binding_match_is_warning() {
        let mut c = valid_config();
        let binding = Binding {
            agent_id: "a1".into(),
            match_: BindingMatch {
                channel: Some("whatsapp".into()),
                ..Default::default()
            },
        };
        c.router.bindings.push(binding.clone());
        c.router.bindings.push(binding);
        let issues = c.validate();
        let issue = find_issue(&issues, "router.bindings[1]").expect("expected duplicate warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError::error("x.y", "bad value");
        assert_eq!(err.to_string(), "[ERROR] x.y: bad value");
    }
}
