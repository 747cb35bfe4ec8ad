//! FIFO blocking queue with a capacity that can change while in use
//!
//! The bound is enforced externally to the underlying deque so it can be
//! raised or lowered at any time. Shrinking below the current length never
//! evicts anything: the queue simply stays over capacity until consumers
//! drain it below the new bound.

use crate::error::{AgentError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Capacity value meaning "no bound"
pub const UNBOUNDED: usize = 0;

/// Remaining capacity reported for an unbounded queue before subtracting
/// queued items. The controller stores the value as a signed 32-bit integer.
pub const UNBOUNDED_REMAINING: usize = i32::MAX as usize;

/// Name reported to the controller as the queue type
pub const QUEUE_TYPE: &str = "ResizableQueue";

struct QueueState<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> QueueState<T> {
    fn has_room(&self) -> bool {
        self.capacity == UNBOUNDED || self.items.len() < self.capacity
    }

    fn remaining(&self) -> usize {
        let bound = if self.capacity == UNBOUNDED {
            UNBOUNDED_REMAINING
        } else {
            self.capacity
        };
        bound.saturating_sub(self.items.len())
    }
}

/// Length, capacity and remaining room read under one lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    /// `0` means unbounded
    pub capacity: usize,
    pub remaining: usize,
}

/// Bounded FIFO queue whose capacity can be resized live
pub struct ResizableQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> ResizableQueue<T> {
    /// Create a queue with the given capacity (`0` for unbounded)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Create a queue with no bound
    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED)
    }

    /// Insert an item, blocking while the queue is at capacity
    pub fn put(&self, item: T) {
        let mut state = self.state.lock();
        while !state.has_room() {
            self.not_full.wait(&mut state);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Insert an item without blocking; hands the item back if full
    pub fn offer(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.state.lock();
        if !state.has_room() {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Insert an item, waiting up to `timeout` for room
    pub fn offer_timeout(&self, item: T, timeout: Duration) -> std::result::Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.has_room() {
            if self.not_full.wait_until(&mut state, deadline).timed_out() && !state.has_room() {
                return Err(item);
            }
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item, blocking while the queue is empty
    pub fn take(&self) -> T {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Remove the head item if there is one
    pub fn poll(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Remove the head item, waiting up to `timeout` for one to arrive
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let item = state.items.pop_front();
                drop(state);
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Change the capacity bound and return the previous one.
    ///
    /// `0` makes the queue unbounded. Negative values are rejected and the
    /// current capacity is kept. Existing items are never discarded.
    pub fn resize(&self, new_capacity: i64) -> Result<usize> {
        let capacity =
            usize::try_from(new_capacity).map_err(|_| AgentError::InvalidCapacity(new_capacity))?;

        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.capacity, capacity)
        };

        // Waiters re-check their predicate against the new bound
        self.not_full.notify_all();
        self.not_empty.notify_all();

        Ok(previous)
    }

    /// Remove and return every queued item in FIFO order
    pub fn drain_all(&self) -> Vec<T> {
        let items: Vec<T> = self.state.lock().items.drain(..).collect();
        if !items.is_empty() {
            self.not_full.notify_all();
        }
        items
    }

    /// Current number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Current capacity bound (`0` means unbounded)
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Number of items that can be added before `put` would block.
    ///
    /// Zero while the queue is over capacity after a shrink. An unbounded
    /// queue counts down from [`UNBOUNDED_REMAINING`].
    pub fn remaining_capacity(&self) -> usize {
        self.state.lock().remaining()
    }

    /// Consistent point-in-time view of the queue
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            len: state.items.len(),
            capacity: state.capacity,
            remaining: state.remaining(),
        }
    }
}

impl<T> std::fmt::Debug for ResizableQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResizableQueue")
            .field("len", &state.items.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}
