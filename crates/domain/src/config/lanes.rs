use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lane Queue (hot-reloadable) and per-connection rate limiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Per-lane capacity for `steer`/`collect`/`followup`. `interrupt` is
    /// never queued and ignores this.
    #[serde(default = "d_lane_capacity")]
    pub lane_capacity: usize,

    /// How long the supervisor waits for `lane.message.ack` before
    /// treating the message as possibly lost. Not part of the original
    /// configuration surface; exposed explicitly rather than hard-coded.
    #[serde(default = "d_lane_ack_timeout_ms")]
    pub lane_ack_timeout_ms: u64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            lane_capacity: d_lane_capacity(),
            lane_ack_timeout_ms: d_lane_ack_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Inbound frames per second allowed per connection before it is
    /// closed with `RateLimited`.
    #[serde(default = "d_max_frames_per_second")]
    pub max_frames_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_frames_per_second: d_max_frames_per_second(),
        }
    }
}

fn d_lane_capacity() -> usize {
    256
}
fn d_lane_ack_timeout_ms() -> u64 {
    2_000
}
fn d_max_frames_per_second() -> u32 {
    100
}
