use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session Manager timers (hot-reloadable)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `connected -> idle` after this many seconds without a heartbeat or
    /// message.
    #[serde(default = "d_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// `idle -> suspended` after this many additional seconds.
    #[serde(default = "d_suspend_timeout_secs")]
    pub suspend_timeout_secs: u64,

    /// Interval between `heartbeat.ping` frames sent by the supervisor.
    #[serde(default = "d_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: d_session_timeout_secs(),
            suspend_timeout_secs: d_suspend_timeout_secs(),
            health_check_interval_secs: d_health_check_interval_secs(),
        }
    }
}

fn d_session_timeout_secs() -> u64 {
    60
}
fn d_suspend_timeout_secs() -> u64 {
    300
}
fn d_health_check_interval_secs() -> u64 {
    30
}
