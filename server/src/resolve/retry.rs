//! Bounded buffer for segments waiting on identifier registration
//!
//! A segment that fails resolution usually succeeds a few seconds later,
//! once the agent's registration traffic lands. Entries are bounded three
//! ways: buffer capacity (oldest dropped first), per-entry attempt count,
//! and per-entry age. Exhausted entries are dropped with a warning; a
//! segment is data, not a liability worth unbounded memory.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::segment::wire::{SegmentObject, UniqueId};

#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub segment: SegmentObject,
    pub trace_ids: Vec<UniqueId>,
    pub attempts: u32,
    pub enqueued_at: Instant,
}

impl PendingSegment {
    pub fn new(segment: SegmentObject, trace_ids: Vec<UniqueId>) -> Self {
        Self {
            segment,
            trace_ids,
            attempts: 0,
            enqueued_at: Instant::now(),
        }
    }

    pub fn segment_id(&self) -> String {
        self.segment
            .segment_id
            .as_ref()
            .map(UniqueId::joined)
            .unwrap_or_default()
    }
}

pub struct RetryBuffer {
    entries: VecDeque<PendingSegment>,
    capacity: usize,
    max_attempts: u32,
    max_age: Duration,
    dropped: u64,
}

impl RetryBuffer {
    pub fn new(capacity: usize, max_attempts: u32, max_age: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            max_attempts,
            max_age,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total segments dropped over the buffer's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Park a segment for a later attempt. At capacity the oldest entry is
    /// evicted to make room.
    pub fn push(&mut self, pending: PendingSegment) {
        if self.entries.len() >= self.capacity
            && let Some(evicted) = self.entries.pop_front()
        {
            self.dropped += 1;
            tracing::warn!(
                segment_id = %evicted.segment_id(),
                attempts = evicted.attempts,
                "Retry buffer full, dropping oldest unresolved segment"
            );
        }
        self.entries.push_back(pending);
    }

    /// Take every entry still worth retrying, with its attempt count
    /// incremented. Entries past the attempt or age bound are dropped here.
    pub fn take_due(&mut self) -> Vec<PendingSegment> {
        let mut due = Vec::with_capacity(self.entries.len());
        for mut pending in self.entries.drain(..) {
            pending.attempts += 1;
            if pending.attempts > self.max_attempts {
                self.dropped += 1;
                tracing::warn!(
                    segment_id = %pending.segment_id(),
                    attempts = pending.attempts - 1,
                    "Dropping unresolved segment after max retry attempts"
                );
                continue;
            }
            if pending.enqueued_at.elapsed() > self.max_age {
                self.dropped += 1;
                tracing::warn!(
                    segment_id = %pending.segment_id(),
                    age_secs = pending.enqueued_at.elapsed().as_secs(),
                    "Dropping unresolved segment past max age"
                );
                continue;
            }
            due.push(pending);
        }
        due
    }
}
