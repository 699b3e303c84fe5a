//! Per-node bounded priority queue across the `steer`/`collect`/`followup`
//! lanes, with `interrupt` as a non-queued bypass.
//!
//! Ownership: a `LaneQueue` belongs to exactly one node's connection and is
//! driven by a single producer (the frame dispatcher) and single consumer
//! (the outbound writer) inside the supervisor — no internal locking is
//! required for that access pattern, but the queue itself stays `Send` so
//! the caller can choose to guard it if that changes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ag_protocol::{Lane, LaneMessageBody};

/// What happened when a message was handed to the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Admitted with room to spare.
    Queued,
    /// Admitted, but the lane was full so the oldest message in it (named
    /// here) was evicted to make room — report a `LaneOverflow` error for
    /// the evicted id.
    QueuedWithEviction { evicted_id: String },
    /// `interrupt` lane: never queued. The caller must deliver `msg`
    /// immediately, ahead of any pending dequeue.
    DeliverInline,
}

struct PendingAck {
    lane: Lane,
    enqueued_at: Instant,
}

pub struct LaneQueue {
    capacity: usize,
    steer: VecDeque<LaneMessageBody>,
    collect: VecDeque<LaneMessageBody>,
    followup: VecDeque<LaneMessageBody>,
    pending_acks: HashMap<String, PendingAck>,
}

impl LaneQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            steer: VecDeque::new(),
            collect: VecDeque::new(),
            followup: VecDeque::new(),
            pending_acks: HashMap::new(),
        }
    }

    fn queue_for(&mut self, lane: Lane) -> Option<&mut VecDeque<LaneMessageBody>> {
        match lane {
            Lane::Steer => Some(&mut self.steer),
            Lane::Collect => Some(&mut self.collect),
            Lane::Followup => Some(&mut self.followup),
            Lane::Interrupt => None,
        }
    }

    /// Enqueues `msg` on `lane`. `interrupt` is reported back as
    /// [`EnqueueOutcome::DeliverInline`] without being queued at all —
    /// the caller is responsible for writing it to the connection ahead
    /// of the next `dequeue`.
    pub fn enqueue(&mut self, lane: Lane, msg: LaneMessageBody) -> EnqueueOutcome {
        let Some(queue) = self.queue_for(lane) else {
            return EnqueueOutcome::DeliverInline;
        };

        let capacity = self.capacity;
        let evicted = if queue.len() >= capacity {
            queue.pop_front()
        } else {
            None
        };
        if let Some(ref evicted) = evicted {
            self.pending_acks.remove(&evicted.id);
        }

        let queue = self.queue_for(lane).expect("non-interrupt lane");
        queue.push_back(msg);

        match evicted {
            Some(evicted) => EnqueueOutcome::QueuedWithEviction {
                evicted_id: evicted.id,
            },
            None => EnqueueOutcome::Queued,
        }
    }

    /// Pops the oldest message from the highest-priority non-empty lane
    /// (`steer` > `collect` > `followup`), fair within a lane, strict
    /// across lanes. Registers a pending ack for the returned message.
    pub fn dequeue(&mut self, now: Instant) -> Option<(Lane, LaneMessageBody)> {
        for lane in [Lane::Steer, Lane::Collect, Lane::Followup] {
            let queue = self.queue_for(lane).expect("non-interrupt lane");
            if let Some(msg) = queue.pop_front() {
                self.pending_acks.insert(
                    msg.id.clone(),
                    PendingAck {
                        lane,
                        enqueued_at: now,
                    },
                );
                return Some((lane, msg));
            }
        }
        None
    }

    /// Clears the pending-ack obligation for `message_id`. Returns `true`
    /// if one was outstanding.
    pub fn ack(&mut self, message_id: &str) -> bool {
        self.pending_acks.remove(message_id).is_some()
    }

    /// Returns ids of messages dequeued more than `timeout` ago with no
    /// ack yet. Does not clear them — the supervisor decides whether to
    /// re-emit or merely surface the miss (at-least-once, not exactly-once).
    pub fn overdue_acks(&self, timeout: Duration, now: Instant) -> Vec<String> {
        self.pending_acks
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.enqueued_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steer.is_empty() && self.collect.is_empty() && self.followup.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> LaneMessageBody {
        LaneMessageBody {
            id: id.into(),
            channel_id: "c1".into(),
            payload: serde_json::json!({}),
            timestamp: 1,
            routing_context: None,
        }
    }

    #[test]
    fn dequeue_respects_priority_then_fifo() {
        let mut q = LaneQueue::new(10);
        q.enqueue(Lane::Collect, msg("a"));
        q.enqueue(Lane::Collect, msg("b"));
        q.enqueue(Lane::Steer, msg("c"));

        let now = Instant::now();
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(now).map(|(_, m)| m.id)).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn overflow_evicts_oldest_in_lane() {
        let mut q = LaneQueue::new(2);
        q.enqueue(Lane::Collect, msg("a"));
        q.enqueue(Lane::Collect, msg("b"));
        let outcome = q.enqueue(Lane::Collect, msg("c"));
        assert_eq!(
            outcome,
            EnqueueOutcome::QueuedWithEviction {
                evicted_id: "a".into()
            }
        );

        let now = Instant::now();
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(now).map(|(_, m)| m.id)).collect();
        assert_eq!(order, vec!["b", "c"]);
    }

    #[test]
    fn interrupt_is_never_queued() {
        let mut q = LaneQueue::new(10);
        q.enqueue(Lane::Collect, msg("a"));
        q.enqueue(Lane::Collect, msg("b"));
        q.enqueue(Lane::Collect, msg("c"));
        let outcome = q.enqueue(Lane::Interrupt, msg("x"));
        assert_eq!(outcome, EnqueueOutcome::DeliverInline);

        // Queued items are untouched by the interrupt.
        let now = Instant::now();
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(now).map(|(_, m)| m.id)).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn ack_clears_pending() {
        let mut q = LaneQueue::new(10);
        q.enqueue(Lane::Steer, msg("a"));
        let now = Instant::now();
        q.dequeue(now);
        assert_eq!(q.pending_ack_count(), 1);
        assert!(q.ack("a"));
        assert_eq!(q.pending_ack_count(), 0);
        assert!(!q.ack("a"));
    }

    #[test]
    fn overdue_ack_is_reported_after_timeout() {
        let mut q = LaneQueue::new(10);
        q.enqueue(Lane::Steer, msg("a"));
        let enqueued_at = Instant::now();
        q.dequeue(enqueued_at);

        let later = enqueued_at + Duration::from_millis(10);
        assert!(q.overdue_acks(Duration::from_millis(5), later).contains(&"a".to_string()));
        assert!(q.overdue_acks(Duration::from_secs(1), later).is_empty());
    }

    #[test]
    fn eviction_drops_evicted_messages_ack_obligation() {
        let mut q = LaneQueue::new(1);
        q.enqueue(Lane::Collect, msg("a"));
        let now = Instant::now();
        // "a" is still queued (never dequeued), so no pending ack yet.
        assert_eq!(q.pending_ack_count(), 0);
        q.enqueue(Lane::Collect, msg("b"));
        q.dequeue(now);
        assert_eq!(q.pending_ack_count(), 1);
    }
}
