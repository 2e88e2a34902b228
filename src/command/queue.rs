//! FIFO of commands waiting for dispatch

use ilo_shared::Command;
use std::collections::VecDeque;

/// Unbounded FIFO; no deduplication
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    enqueued_total: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push_back(command);
        self.enqueued_total += 1;
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            self.push(command);
        }
    }

    /// Remove the oldest command
    pub fn pop(&mut self) -> Option<Command> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Commands ever enqueued
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total
    }

    /// Pending commands, oldest first
    #[cfg(test)]
    pub fn pending(&self) -> Vec<Command> {
        self.pending.iter().copied().collect()
    }
}
