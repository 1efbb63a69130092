use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority level meaning "did you arrive" for the current stop
pub const CURRENT_STOP_PRIORITY: i32 = 1;
/// Priority level meaning "did you arrive" for any other stop
pub const GENERAL_PRIORITY: i32 = 2;

/// The two recognized levels that open a confirmation prompt; anything else
/// is ordinary trip-panel traffic.
pub fn is_confirmation_priority(priority: i32) -> bool {
    priority == CURRENT_STOP_PRIORITY || priority == GENERAL_PRIORITY
}

/// A pending geofence-arrival prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalTrigger {
    pub trigger_id: Uuid,
    pub stop_id: String,
    pub priority: i32,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl ArrivalTrigger {
    pub fn new(stop_id: impl Into<String>, priority: i32, message: impl Into<String>) -> Self {
        Self {
            trigger_id: Uuid::new_v4(),
            stop_id: stop_id.into(),
            priority,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    trigger: ArrivalTrigger,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.trigger.priority == other.trigger.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap is a max-heap; compare reversed so the lowest
    // (priority, arrival order) pair surfaces first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .trigger
            .priority
            .cmp(&self.trigger.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Bounded priority queue of arrival prompts.
///
/// Owned by the coordinator actor alone; only the head is ever surfaced,
/// and entries leave exactly once when acknowledged, expired, or responded
/// to.
pub struct PromptQueue {
    heap: BinaryHeap<QueueEntry>,
    capacity: usize,
    seq: u64,
}

impl PromptQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity,
            seq: 0,
        }
    }

    /// Enqueue a trigger. Returns false when the queue is full or the stop
    /// already has a pending prompt.
    pub fn push(&mut self, trigger: ArrivalTrigger) -> bool {
        if self.contains(&trigger.stop_id) || self.heap.len() >= self.capacity {
            return false;
        }
        self.seq += 1;
        self.heap.push(QueueEntry {
            trigger,
            seq: self.seq,
        });
        true
    }

    pub fn peek(&self) -> Option<&ArrivalTrigger> {
        self.heap.peek().map(|entry| &entry.trigger)
    }

    pub fn pop(&mut self) -> Option<ArrivalTrigger> {
        self.heap.pop().map(|entry| entry.trigger)
    }

    /// Remove the entry for one stop, wherever it sits in the queue.
    pub fn remove(&mut self, stop_id: &str) -> Option<ArrivalTrigger> {
        let mut removed = None;
        let entries = std::mem::take(&mut self.heap).into_vec();
        for entry in entries {
            if removed.is_none() && entry.trigger.stop_id == stop_id {
                removed = Some(entry.trigger);
            } else {
                self.heap.push(entry);
            }
        }
        removed
    }

    pub fn contains(&self, stop_id: &str) -> bool {
        self.heap.iter().any(|entry| entry.trigger.stop_id == stop_id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Snapshot in display order, for persistence.
    pub fn snapshot(&self) -> Vec<ArrivalTrigger> {
        let mut entries: Vec<&QueueEntry> = self.heap.iter().collect();
        entries.sort_by(|a, b| {
            a.trigger
                .priority
                .cmp(&b.trigger.priority)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.trigger.clone()).collect()
    }
}
