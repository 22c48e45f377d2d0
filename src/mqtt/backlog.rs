//! Bounded FIFO of publishes generated while the broker was unreachable.

use super::message_manager::OutboundMessage;
use std::collections::VecDeque;
use tracing::{info, warn};

pub const DEFAULT_CAPACITY: usize = 10;

/// Result of replaying the backlog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct OutboundBacklog {
    queue: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl Default for OutboundBacklog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl OutboundBacklog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.queue.iter()
    }

    /// Appends at the tail. When full, the oldest message is evicted and returned.
    pub fn push(&mut self, msg: OutboundMessage) -> Option<OutboundMessage> {
        let evicted = if self.queue.len() >= self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            warn!("Backlog full ({}), dropping oldest message: {}", self.capacity, old);
        }
        self.queue.push_back(msg);
        evicted
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.queue.pop_front()
    }

    /// Hands every message to `deliver` in FIFO order until the backlog is empty.
    ///
    /// Each message leaves the backlog before `deliver` runs; a failed delivery is logged and
    /// the message is gone. Replay is at-most-once.
    pub fn drain_all<F, E>(&mut self, mut deliver: F) -> DrainReport
    where
        F: FnMut(OutboundMessage) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let mut report = DrainReport::default();
        while let Some(msg) = self.pop() {
            let shown = msg.to_string();
            match deliver(msg) {
                Ok(()) => {
                    info!("Resent message: {}", shown);
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!("Resend of {} failed, message dropped: {}", shown, e);
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(backlog: &OutboundBacklog) -> Vec<&str> {
        backlog.iter().map(|m| m.payload()).collect()
    }

    #[test]
    fn drains_in_push_order() {
        let mut backlog = OutboundBacklog::default();
        for p in ["A", "B", "C"] {
            assert!(backlog.push(OutboundMessage::new(p)).is_none());
        }

        let mut delivered = Vec::new();
        let report = backlog.drain_all(|m| {
            delivered.push(m.into_payload());
            Ok::<(), String>(())
        });

        assert_eq!(delivered, ["A", "B", "C"]);
        assert_eq!(report, DrainReport { delivered: 3, dropped: 0 });
        assert!(backlog.is_empty());
    }

    #[test]
    fn failed_delivery_is_not_requeued() {
        let mut backlog = OutboundBacklog::default();
        for p in ["A", "B", "C"] {
            backlog.push(OutboundMessage::new(p));
        }

        let mut attempts = Vec::new();
        let report = backlog.drain_all(|m| {
            attempts.push(m.payload().to_string());
            if m.payload() == "B" {
                Err("broker went away")
            } else {
                Ok(())
            }
        });

        assert_eq!(attempts, ["A", "B", "C"]);
        assert_eq!(report, DrainReport { delivered: 2, dropped: 1 });
        assert!(backlog.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut backlog = OutboundBacklog::with_capacity(3);
        for p in ["1", "2", "3"] {
            backlog.push(OutboundMessage::new(p));
        }

        let evicted = backlog.push(OutboundMessage::new("4"));

        assert_eq!(evicted.map(OutboundMessage::into_payload).as_deref(), Some("1"));
        assert_eq!(payloads(&backlog), ["2", "3", "4"]);
        assert_eq!(backlog.len(), backlog.capacity());
    }

    #[test]
    fn default_capacity_is_ten() {
        let mut backlog = OutboundBacklog::default();
        for i in 0..10 {
            assert!(backlog.push(OutboundMessage::new(i.to_string())).is_none());
        }
        assert!(backlog.push(OutboundMessage::new("10")).is_some());
        assert_eq!(backlog.len(), 10);
    }
}
