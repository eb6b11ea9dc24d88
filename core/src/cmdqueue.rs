//! The time-ordered command queue.
//!
//! RULES:
//!   - Commands leave the queue in `(due_time, sequence)` order. Two
//!     commands due at the same tick leave in insertion order.
//!   - A command scheduled in the past is kept and runs at the next poll.
//!   - Cancelled commands stay in the heap and are skipped when they
//!     reach the head; nothing is ever dropped without a cancel.

use crate::{
    command::{Command, CommandPayload},
    object::ObjectId,
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

/// Heap wrapper ordering commands by `(due_time, sequence)` only.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Queued(Command);

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key().cmp(&other.0.key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    heap:          BinaryHeap<Reverse<Queued>>,
    next_sequence: u64,
    cancelled:     BTreeSet<u64>,
}

/// Serializable form of the queue for savegames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub next_sequence: u64,
    pub pending:       Vec<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a command; returns its sequence number.
    pub fn schedule(
        &mut self,
        due_time: SimTime,
        target: Option<ObjectId>,
        payload: CommandPayload,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Queued(Command {
            due_time,
            sequence,
            target,
            payload,
        })));
        sequence
    }

    /// Remove and return the next live command due at or before `now`.
    pub fn pop_next_due(&mut self, now: SimTime) -> Option<Command> {
        loop {
            let head = self.heap.peek()?;
            if head.0 .0.due_time > now {
                return None;
            }
            let Reverse(Queued(command)) = self.heap.pop()?;
            if self.cancelled.remove(&command.sequence) {
                log::trace!("skipping cancelled command {}", command.sequence);
                continue;
            }
            return Some(command);
        }
    }

    /// Remove and return every live command due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Vec<Command> {
        std::iter::from_fn(|| self.pop_next_due(now)).collect()
    }

    /// Due time of the earliest command still queued (cancelled or not).
    pub fn peek_due_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|head| head.0 .0.due_time)
    }

    /// Mark a pending command as a no-op. Returns false if it is not
    /// pending (already run, or cancelled before).
    pub fn cancel(&mut self, sequence: u64) -> bool {
        let pending = self.heap.iter().any(|q| q.0 .0.sequence == sequence);
        pending && self.cancelled.insert(sequence)
    }

    /// Cancel every pending command addressed to `target`.
    pub fn cancel_target(&mut self, target: ObjectId) -> usize {
        let doomed: Vec<u64> = self
            .heap
            .iter()
            .map(|q| &q.0 .0)
            .filter(|c| c.target == Some(target))
            .map(|c| c.sequence)
            .collect();
        doomed
            .into_iter()
            .filter(|&sequence| self.cancelled.insert(sequence))
            .count()
    }

    /// Live commands still queued.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Live commands in dispatch order.
    pub fn pending(&self) -> Vec<Command> {
        let mut pending: Vec<Command> = self
            .heap
            .iter()
            .map(|q| q.0 .0.clone())
            .filter(|c| !self.cancelled.contains(&c.sequence))
            .collect();
        pending.sort_by_key(Command::key);
        pending
    }

    pub fn save_state(&self) -> QueueState {
        QueueState {
            next_sequence: self.next_sequence,
            pending:       self.pending(),
        }
    }

    /// Rebuild a queue from a savegame. Sequences are kept as saved so
    /// the tie-break order survives the round trip.
    pub fn restore(state: QueueState) -> Self {
        let heap = state
            .pending
            .into_iter()
            .map(|c| Reverse(Queued(c)))
            .collect();
        Self {
            heap,
            next_sequence: state.next_sequence,
            cancelled:     BTreeSet::new(),
        }
    }
}
