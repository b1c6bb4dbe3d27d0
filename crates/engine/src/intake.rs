//! Bounded intake buffer
//!
//! FIFO hand-off between producers and the writer. Producers block for at
//! most their wait budget when the buffer is full; the writer never blocks.

use eventstore_core::PendingMessage;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Longest single wait before a blocked producer re-checks for space
const OFFER_RETRY_SLICE: Duration = Duration::from_millis(100);

/// Bounded FIFO of pending messages
pub struct IntakeBuffer {
    queue: Mutex<VecDeque<PendingMessage>>,
    not_full: Condvar,
    capacity: usize,
}

impl IntakeBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of buffered messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// True when more than half the capacity is in use
    pub fn is_over_half_full(&self) -> bool {
        self.len() * 2 > self.capacity
    }

    /// Enqueue `message`, waiting up to `max_wait` for space.
    ///
    /// On timeout the message is handed back so the caller can account for it.
    pub fn offer(&self, message: PendingMessage, max_wait: Duration) -> Result<(), PendingMessage> {
        let deadline = Instant::now() + max_wait;
        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(message);
            }
            let slice = (deadline - now).min(OFFER_RETRY_SLICE);
            self.not_full.wait_for(&mut queue, slice);
        }
        queue.push_back(message);
        Ok(())
    }

    /// Remove up to `max` messages, oldest first
    pub fn drain_up_to(&self, max: usize) -> Vec<PendingMessage> {
        let drained: Vec<PendingMessage> = {
            let mut queue = self.queue.lock();
            let take = max.min(queue.len());
            queue.drain(..take).collect()
        };
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }
}
