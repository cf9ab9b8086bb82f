//! The contract every port implements.
//!
//! The protocol stack is generic over [`SysArch`] and never names a port.
//! All handles are owned values: creating an object returns a handle, and
//! the matching `*_free` consumes it. Handles that are dropped without being
//! freed leak their backing object, exactly as an unreleased kernel object
//! would.
//!
//! Timeouts are milliseconds, with [`WAIT_FOREVER`](crate::WAIT_FOREVER)
//! (zero) meaning no limit. Successful timed calls report the elapsed time,
//! normalised to at least 1 ms.

use alloc::boxed::Box;
use core::fmt;

use crate::error::{MailboxBusy, SysError, SysResult, TryPostError};
use crate::mail::Mail;
use crate::stats::SysStatsSnapshot;

/// Longest thread or object name kept by a port.
pub const THREAD_NAME_LEN: usize = 16;

pub type ThreadName = heapless::String<THREAD_NAME_LEN>;

/// Entry closure handed to a kernel task.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Copies `name` into a fixed-size buffer, truncating on a char boundary.
pub fn thread_name(name: &str) -> ThreadName {
    let mut fixed = ThreadName::new();
    for ch in name.chars() {
        if fixed.push(ch).is_err() {
            break;
        }
    }
    fixed
}

/// Lifecycle of a thread created through [`SysArch::thread_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThreadState {
    /// Created, entry not started yet.
    Created,
    Running,
    /// Entry returned.
    Terminated,
    /// Removed by [`SysArch::thread_delete`].
    Deleted,
}

impl ThreadState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Terminated,
            _ => Self::Deleted,
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Terminated => 2,
            Self::Deleted => 3,
        }
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Deleted)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Thread state stored in an atomic, shared with the thread trampoline.
#[derive(Debug, Default)]
pub struct AtomicThreadState(core::sync::atomic::AtomicU8);

impl AtomicThreadState {
    pub const fn new(state: ThreadState) -> Self {
        Self(core::sync::atomic::AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> ThreadState {
        ThreadState::from_u8(self.0.load(core::sync::atomic::Ordering::Acquire))
    }

    pub fn store(&self, state: ThreadState) {
        self.0.store(state.as_u8(), core::sync::atomic::Ordering::Release);
    }
}

/// Mailboxes, semaphores, mutexes and threads for one scheduler.
pub trait SysArch: Send + Sync {
    type Mailbox<M: Mail>: Send + Sync;
    type Semaphore: Send + Sync;
    type Mutex: Send + Sync;
    type Thread: Send;

    /// Creates a mailbox holding up to `capacity` messages.
    fn mbox_new<M: Mail>(&self, capacity: usize) -> SysResult<Self::Mailbox<M>>;

    /// Posts `msg`, waiting as long as needed for room.
    ///
    /// From interrupt context the post never waits; a message that does not
    /// fit is dropped and counted as a mailbox error.
    fn mbox_post<M: Mail>(&self, mbox: &Self::Mailbox<M>, msg: M);

    /// Posts `msg` only if there is room. Safe from interrupt context.
    fn mbox_trypost<M: Mail>(&self, mbox: &Self::Mailbox<M>, msg: M)
        -> Result<(), TryPostError<M>>;

    /// Waits up to `timeout_ms` for a message. Returns it with the elapsed
    /// milliseconds.
    fn mbox_fetch<M: Mail>(&self, mbox: &Self::Mailbox<M>, timeout_ms: u32) -> SysResult<(M, u32)>;

    /// Takes a message if one is queued. Safe from interrupt context.
    fn mbox_tryfetch<M: Mail>(&self, mbox: &Self::Mailbox<M>) -> SysResult<M>;

    /// Messages currently queued.
    fn mbox_len<M: Mail>(&self, mbox: &Self::Mailbox<M>) -> usize;

    /// Destroys an empty mailbox. A non-empty one is handed back.
    fn mbox_free<M: Mail>(&self, mbox: Self::Mailbox<M>) -> Result<(), MailboxBusy<Self::Mailbox<M>>>;

    /// Whether the handle still names a live mailbox.
    ///
    /// Freeing consumes the handle, so an owned handle is live unless the
    /// backend recycles slots behind it. Backends whose handles own the
    /// kernel object outright always answer `true`.
    fn mbox_valid<M: Mail>(&self, mbox: &Self::Mailbox<M>) -> bool;

    /// Creates an unbounded counting semaphore.
    fn sem_new(&self, count: u32) -> SysResult<Self::Semaphore> {
        self.sem_new_bounded(count, u32::MAX)
    }

    /// Creates a semaphore whose count never exceeds `max`. A binary
    /// semaphore has `max == 1`.
    fn sem_new_bounded(&self, count: u32, max: u32) -> SysResult<Self::Semaphore>;

    /// Waits up to `timeout_ms` for the count to become positive, then
    /// decrements it. Returns the elapsed milliseconds.
    fn sem_wait(&self, sem: &Self::Semaphore, timeout_ms: u32) -> SysResult<u32>;

    /// Increments the count. Safe from interrupt context.
    fn sem_signal(&self, sem: &Self::Semaphore);

    fn sem_free(&self, sem: Self::Semaphore);

    /// See [`SysArch::mbox_valid`].
    fn sem_valid(&self, sem: &Self::Semaphore) -> bool;

    fn mutex_new(&self) -> SysResult<Self::Mutex>;

    /// Blocks until the mutex is held by the caller. Not recursive.
    fn mutex_lock(&self, mutex: &Self::Mutex) -> SysResult<()>;

    fn mutex_unlock(&self, mutex: &Self::Mutex) -> SysResult<()>;

    fn mutex_free(&self, mutex: Self::Mutex);

    /// See [`SysArch::mbox_valid`].
    fn mutex_valid(&self, mutex: &Self::Mutex) -> bool;

    /// Starts `entry` on a new thread.
    ///
    /// `stack_size` is in the unit of the backend (bytes for host threads,
    /// stack words for RTOS kernels). `priority` uses the "larger is more
    /// urgent" convention; ports translate it to the native range.
    fn thread_new<F>(
        &self,
        name: &str,
        entry: F,
        stack_size: usize,
        priority: i32,
    ) -> SysResult<Self::Thread>
    where
        F: FnOnce() + Send + 'static;

    /// Stops a thread and releases its resources.
    fn thread_delete(&self, thread: Self::Thread) -> SysResult<()> {
        drop(thread);
        Err(SysError::Unsupported)
    }

    fn thread_state(&self, thread: &Self::Thread) -> ThreadState;

    /// Milliseconds since the scheduler started, wrapping with its counter.
    fn now_ms(&self) -> u32;

    fn stats(&self) -> SysStatsSnapshot;
}
