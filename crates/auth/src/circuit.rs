use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-node circuit breaker in front of the (comparatively expensive)
/// signature-verification path. A node that fails authentication
/// repeatedly within the cooldown window is short-circuited to an
/// immediate rejection instead of re-running JWT/TOFU checks on every
/// attempt; a single success clears its breaker.
pub struct AuthCircuitBreaker {
    failures: Mutex<HashMap<String, NodeFailures>>,
    cooldown: Duration,
    threshold: u32,
}

struct NodeFailures {
    count: u32,
    opened_at: Instant,
}

impl AuthCircuitBreaker {
    pub fn new(cooldown: Duration, threshold: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            cooldown,
            threshold,
        }
    }

    /// `true` if this node is currently short-circuited.
    pub fn is_open(&self, node_id: &str) -> bool {
        let mut failures = self.failures.lock();
        match failures.get(node_id) {
            Some(f) if f.count >= self.threshold => {
                if f.opened_at.elapsed() >= self.cooldown {
                    failures.remove(node_id);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_failure(&self, node_id: &str) {
        let mut failures = self.failures.lock();
        let entry = failures.entry(node_id.to_string()).or_insert(NodeFailures {
            count: 0,
            opened_at: Instant::now(),
        });
        entry.count += 1;
        if entry.count >= self.threshold {
            entry.opened_at = Instant::now();
        }
    }

    pub fn record_success(&self, node_id: &str) {
        self.failures.lock().remove(node_id);
    }
}
