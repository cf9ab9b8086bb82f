//! Execution-context capability.
//!
//! Ports ask an [`ExecContext`] whether the caller runs in interrupt context
//! and, when an interrupt-safe call wakes a task, request a reschedule that
//! the interrupt exit path performs. [`IsrFlag`] is the stock implementation:
//! interrupt glue enters it on entry and finishes the guard on exit.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::sync::Arc;

pub trait ExecContext: Send + Sync {
    /// True while the caller executes an interrupt handler.
    fn in_isr(&self) -> bool;

    /// Asks for a context switch once the interrupt returns.
    fn request_yield(&self);
}

impl<T: ExecContext + ?Sized> ExecContext for &T {
    fn in_isr(&self) -> bool {
        (**self).in_isr()
    }

    fn request_yield(&self) {
        (**self).request_yield()
    }
}

impl<T: ExecContext + ?Sized> ExecContext for Arc<T> {
    fn in_isr(&self) -> bool {
        (**self).in_isr()
    }

    fn request_yield(&self) {
        (**self).request_yield()
    }
}

/// Interrupt nesting counter plus a deferred-yield flag.
#[derive(Debug)]
pub struct IsrFlag {
    nesting: AtomicU32,
    yield_pending: AtomicBool,
}

/// Process-wide flag used by ports that are not given their own context.
pub static INSIDE_ISR: IsrFlag = IsrFlag::new();

impl IsrFlag {
    pub const fn new() -> Self {
        Self {
            nesting: AtomicU32::new(0),
            yield_pending: AtomicBool::new(false),
        }
    }

    /// Marks interrupt entry. Nested entries are counted.
    pub fn enter(&self) -> IsrGuard<'_> {
        self.nesting.fetch_add(1, Ordering::AcqRel);
        IsrGuard {
            flag: self,
            finished: false,
        }
    }

    pub fn is_yield_pending(&self) -> bool {
        self.yield_pending.load(Ordering::Acquire)
    }

    pub fn nesting(&self) -> u32 {
        self.nesting.load(Ordering::Acquire)
    }

    /// Leaves one nesting level. The outermost exit consumes the pending yield.
    fn exit(&self) -> bool {
        let previous = self.nesting.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "interrupt exit without entry");
        previous == 1 && self.yield_pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for IsrFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecContext for IsrFlag {
    fn in_isr(&self) -> bool {
        self.nesting.load(Ordering::Acquire) > 0
    }

    fn request_yield(&self) {
        self.yield_pending.store(true, Ordering::Release);
    }
}

/// Interrupt scope. Dropping it exits the interrupt and discards the result.
#[derive(Debug)]
#[must_use = "dropping the guard immediately leaves interrupt context"]
pub struct IsrGuard<'a> {
    flag: &'a IsrFlag,
    finished: bool,
}

impl IsrGuard<'_> {
    /// Leaves interrupt context and reports whether a reschedule is due.
    pub fn finish(mut self) -> bool {
        self.finished = true;
        self.flag.exit()
    }
}

impl Drop for IsrGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.flag.exit();
        }
    }
}

/// Context for hosts without interrupts: always task context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext;

impl ExecContext for TaskContext {
    fn in_isr(&self) -> bool {
        false
    }

    fn request_yield(&self) {}
}
