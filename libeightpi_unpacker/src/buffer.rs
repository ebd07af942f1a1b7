use std::collections::VecDeque;

use super::event::BuiltEvent;

/// Bounded queue between the event builder and the sink thread.
///
/// Starts at the configured capacity and grows by that same step when full,
/// up to the configured maximum. Once the maximum is reached the producer has
/// to wait for the consumer; the orchestrator owns that wait.
#[derive(Debug)]
pub struct BuiltQueue {
    queue: VecDeque<BuiltEvent>,
    capacity: usize,
    growth_step: usize,
    max_capacity: usize,
    nof_grows: u32,
}

impl BuiltQueue {
    pub fn new(capacity: usize, max_capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            growth_step: capacity,
            max_capacity,
            nof_grows: 0,
        }
    }

    pub fn push(&mut self, event: BuiltEvent) {
        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<BuiltEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn nof_grows(&self) -> u32 {
        self.nof_grows
    }

    /// Grow by the initial capacity, up to the configured maximum.
    /// Returns false when the maximum is reached.
    pub fn try_grow(&mut self) -> bool {
        if self.capacity + self.growth_step > self.max_capacity {
            return false;
        }
        self.capacity += self.growth_step;
        self.nof_grows += 1;
        true
    }
}
