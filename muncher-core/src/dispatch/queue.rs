//! Priority-ordered pending sequence.
//!
//! Entries are kept sorted by `(priority desc, seq asc)`. A new entry goes in
//! front of the first entry with a strictly lower priority, so it always lands
//! behind every entry of equal priority that arrived before it.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

/// Service priority; higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Ordinary callers
    pub const STANDARD: Priority = Priority(0);

    /// Callers with supporter status
    pub const SUPPORTER: Priority = Priority(1);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry waiting in the queue
pub struct Pending<J> {
    /// Service priority
    pub priority: Priority,
    /// Arrival order, unique per queue
    pub seq: u64,
    /// When the entry was submitted
    pub enqueued_at: Instant,
    /// The work to run
    pub job: J,
}

impl<J> fmt::Debug for Pending<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Pending entries in dispatch order
pub struct PendingQueue<J> {
    entries: VecDeque<Pending<J>>,
    next_seq: u64,
}

impl<J> PendingQueue<J> {
    pub fn new() -> Self {
        Self { entries: VecDeque::new(), next_seq: 0 }
    }

    /// Insert a job and return its arrival sequence number
    pub fn push(&mut self, job: J, priority: Priority, enqueued_at: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());

        self.entries.insert(pos, Pending { priority, seq, enqueued_at, job });
        seq
    }

    /// Remove the entry that should run next
    pub fn pop_front(&mut self) -> Option<Pending<J>> {
        self.entries.pop_front()
    }

    /// Entry that would run next
    pub fn peek(&self) -> Option<&Pending<J>> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waiting entries per priority, highest first
    pub fn depth_by_priority(&self) -> Vec<(Priority, usize)> {
        let mut depths: Vec<(Priority, usize)> = Vec::new();
        for entry in &self.entries {
            match depths.last_mut() {
                Some((p, n)) if *p == entry.priority => *n += 1,
                _ => depths.push((entry.priority, 1)),
            }
        }
        depths
    }
}

impl<J> Default for PendingQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}
