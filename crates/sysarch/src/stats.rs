//! Per-kind usage counters kept by every port.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ResourceKind;

/// `used`/`max`/`err` counters for one object kind.
#[derive(Debug, Default)]
pub struct StatCounter {
    used: AtomicUsize,
    max: AtomicUsize,
    err: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatSnapshot {
    pub used: usize,
    pub max: usize,
    pub err: usize,
}

impl StatCounter {
    pub const fn new() -> Self {
        Self {
            used: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
            err: AtomicUsize::new(0),
        }
    }

    pub fn on_create(&self) {
        let used = self.used.fetch_add(1, Ordering::AcqRel) + 1;
        self.max.fetch_max(used, Ordering::AcqRel);
    }

    pub fn on_free(&self) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_sub(1));
    }

    pub fn on_error(&self) {
        self.err.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            used: self.used.load(Ordering::Acquire),
            max: self.max.load(Ordering::Acquire),
            err: self.err.load(Ordering::Acquire),
        }
    }
}

/// Counters for every object kind a port manages.
#[derive(Debug, Default)]
pub struct SysStats {
    pub mbox: StatCounter,
    pub sem: StatCounter,
    pub mutex: StatCounter,
    pub thread: StatCounter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SysStatsSnapshot {
    pub mbox: StatSnapshot,
    pub sem: StatSnapshot,
    pub mutex: StatSnapshot,
    pub thread: StatSnapshot,
}

impl SysStats {
    pub const fn new() -> Self {
        Self {
            mbox: StatCounter::new(),
            sem: StatCounter::new(),
            mutex: StatCounter::new(),
            thread: StatCounter::new(),
        }
    }

    /// Counter for `kind`. Stacks are accounted with threads.
    pub fn counter(&self, kind: ResourceKind) -> &StatCounter {
        match kind {
            ResourceKind::Mailbox => &self.mbox,
            ResourceKind::Semaphore => &self.sem,
            ResourceKind::Mutex => &self.mutex,
            ResourceKind::Thread | ResourceKind::Stack => &self.thread,
        }
    }

    pub fn snapshot(&self) -> SysStatsSnapshot {
        SysStatsSnapshot {
            mbox: self.mbox.snapshot(),
            sem: self.sem.snapshot(),
            mutex: self.mutex.snapshot(),
            thread: self.thread.snapshot(),
        }
    }
}
