//! Blocking primitives on host threads.
//!
//! The POSIX port builds its mailboxes and semaphores from these, and the
//! kernel simulators use them to stand in for RTOS objects.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return immediately.
    No,
    For(Duration),
    Forever,
}

impl Wait {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::For(timeout) => Some(Instant::now() + timeout),
            Self::No | Self::Forever => None,
        }
    }
}

#[derive(Debug)]
struct SemState {
    count: u32,
    max: u32,
    waiters: usize,
}

/// Counting semaphore with an optional ceiling.
#[derive(Debug)]
pub struct HostSemaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

impl HostSemaphore {
    pub fn new(count: u32) -> Self {
        Self::bounded(count, u32::MAX)
    }

    pub fn bounded(count: u32, max: u32) -> Self {
        Self {
            state: Mutex::new(SemState {
                count: count.min(max),
                max,
                waiters: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Reinitialises a recycled semaphore.
    pub fn reset(&self, count: u32, max: u32) {
        let mut state = self.state.lock();
        state.count = count.min(max);
        state.max = max;
    }

    /// Increments the count and wakes one waiter.
    ///
    /// Returns `false` without changing anything when the count is at its
    /// ceiling.
    pub fn post(&self) -> bool {
        let mut state = self.state.lock();
        if state.count >= state.max {
            return false;
        }
        state.count += 1;
        if state.waiters > 0 {
            self.cond.notify_one();
        }
        true
    }

    pub fn try_wait(&self) -> bool {
        self.acquire(Wait::No)
    }

    pub fn wait(&self) {
        self.acquire(Wait::Forever);
    }

    /// Waits up to `timeout`; the count is untouched when it expires.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.acquire(Wait::For(timeout))
    }

    pub fn acquire(&self, wait: Wait) -> bool {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        while state.count == 0 {
            match (wait, deadline) {
                (Wait::No, _) => return false,
                (_, Some(deadline)) => {
                    state.waiters += 1;
                    let expired = self.cond.wait_until(&mut state, deadline).timed_out();
                    state.waiters -= 1;
                    if expired && state.count == 0 {
                        return false;
                    }
                }
                (_, None) => {
                    state.waiters += 1;
                    self.cond.wait(&mut state);
                    state.waiters -= 1;
                }
            }
        }
        state.count -= 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.state.lock().count
    }

    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }
}

impl Default for HostSemaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<usize>,
    capacity: usize,
    receivers_waiting: usize,
    senders_waiting: usize,
}

/// Bounded FIFO of message words, blocking on both ends.
#[derive(Debug)]
pub struct BoundedQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                receivers_waiting: 0,
                senders_waiting: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Empties the queue and sets a new capacity.
    pub fn reset(&self, capacity: usize) {
        let mut state = self.state.lock();
        state.items.clear();
        state.items.reserve(capacity);
        state.capacity = capacity;
    }

    /// Appends `item`, waiting for room as allowed by `wait`.
    pub fn push(&self, item: usize, wait: Wait) -> bool {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        while state.items.len() >= state.capacity {
            match (wait, deadline) {
                (Wait::No, _) => return false,
                (_, Some(deadline)) => {
                    state.senders_waiting += 1;
                    let expired = self.not_full.wait_until(&mut state, deadline).timed_out();
                    state.senders_waiting -= 1;
                    if expired && state.items.len() >= state.capacity {
                        return false;
                    }
                }
                (_, None) => {
                    state.senders_waiting += 1;
                    self.not_full.wait(&mut state);
                    state.senders_waiting -= 1;
                }
            }
        }
        state.items.push_back(item);
        if state.receivers_waiting > 0 {
            self.not_empty.notify_one();
        }
        true
    }

    /// Removes the oldest item, waiting for one as allowed by `wait`.
    pub fn pop(&self, wait: Wait) -> Option<usize> {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                if state.senders_waiting > 0 {
                    self.not_full.notify_one();
                }
                return Some(item);
            }
            match (wait, deadline) {
                (Wait::No, _) => return None,
                (_, Some(deadline)) => {
                    state.receivers_waiting += 1;
                    let expired = self.not_empty.wait_until(&mut state, deadline).timed_out();
                    state.receivers_waiting -= 1;
                    if expired && state.items.is_empty() {
                        return None;
                    }
                }
                (_, None) => {
                    state.receivers_waiting += 1;
                    self.not_empty.wait(&mut state);
                    state.receivers_waiting -= 1;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// True when a receiver is blocked in [`pop`](Self::pop).
    pub fn has_waiting_receivers(&self) -> bool {
        self.state.lock().receivers_waiting > 0
    }
}

impl Default for BoundedQueue {
    fn default() -> Self {
        Self::new(0)
    }
}
