//! sysarch port for POSIX-thread-style hosts.
//!
//! The host kernel offers threads and counting semaphores but no bounded
//! message queue, so this port keeps its own tables like a kernel would:
//!
//! - a mailbox table whose entries hold a ring buffer, a "mail available"
//!   semaphore and a "space available" semaphore,
//! - a thread table whose entries are released when the entry returns,
//! - a semaphore budget shared by mailboxes, semaphores and mutexes.
//!
//! Everything is sized by [`PosixConfig`] when [`PosixSys`] is built.

mod config;
mod error;
mod mailbox;
mod semaphore;
mod thread;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::error;
use sysarch::error::{MailboxBusy, TryPostError};
use sysarch::mail::{self, Mail};
use sysarch::pool::SlotPool;
use sysarch::time::{self, MonotonicTicks, TickSource};
use sysarch::{
    ExecContext, IsrFlag, SysArch, SysResult, SysStats, SysStatsSnapshot, ThreadState, UsageError,
    INSIDE_ISR,
};

pub use config::{PosixConfig, PosixConfigBuilder};
pub use error::PosixError;
pub use mailbox::PosixMailbox;
pub use semaphore::{PosixMutex, PosixSemaphore};
pub use thread::PosixThread;

use mailbox::MboxSlot;
use thread::ThreadSlot;

/// Kernel semaphores consumed by one mailbox.
const SEMS_PER_MAILBOX: usize = 2;

/// Count of kernel semaphores handed out, against a fixed maximum.
#[derive(Debug)]
struct SemBudget {
    in_use: AtomicUsize,
    max: usize,
}

impl SemBudget {
    fn new(max: usize) -> Self {
        Self {
            in_use: AtomicUsize::new(0),
            max,
        }
    }

    fn reserve(&self, count: usize) -> bool {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(count).filter(|total| *total <= self.max)
            })
            .is_ok()
    }

    fn release(&self, count: usize) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(count))
            });
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

/// The POSIX port.
///
/// `C` answers whether the caller runs in interrupt context (signal
/// handlers on a host); `T` provides the tick counter for elapsed times and
/// [`SysArch::now_ms`].
pub struct PosixSys<C = &'static IsrFlag, T = MonotonicTicks> {
    config: PosixConfig,
    context: C,
    clock: T,
    mailboxes: SlotPool<MboxSlot>,
    threads: Arc<SlotPool<ThreadSlot>>,
    sem_budget: SemBudget,
    stats: Arc<SysStats>,
}

impl PosixSys {
    /// Port using the process-wide interrupt flag and the host clock.
    pub fn new(config: PosixConfig) -> Self {
        let clock = MonotonicTicks::new(config.tick_rate_hz);
        Self::with_parts(config, &INSIDE_ISR, clock)
    }
}

impl<C: ExecContext, T: TickSource> PosixSys<C, T> {
    pub fn with_parts(config: PosixConfig, context: C, clock: T) -> Self {
        log::debug!(
            "posix sys init: {} mailboxes x {} slots, {} semaphores, {} threads",
            config.mbox_max,
            config.mbox_size,
            config.sem_max,
            config.thread_max
        );
        Self {
            mailboxes: SlotPool::new("mbox", config.mbox_max, MboxSlot::default),
            threads: Arc::new(SlotPool::new("thread", config.thread_max, ThreadSlot::default)),
            sem_budget: SemBudget::new(config.sem_max),
            stats: Arc::new(SysStats::new()),
            config,
            context,
            clock,
        }
    }

    pub fn config(&self) -> &PosixConfig {
        &self.config
    }

    pub fn clock(&self) -> &T {
        &self.clock
    }

    /// Kernel semaphores currently in use, including those behind mailboxes.
    pub fn semaphores_in_use(&self) -> usize {
        self.sem_budget.in_use()
    }

    fn refuse_in_isr(&self, op: &str) -> SysResult<()> {
        if self.context.in_isr() {
            error!("{op}: suspending call from interrupt context");
            return Err(UsageError::BlockingInIsr.into());
        }
        Ok(())
    }
}

impl<C: ExecContext, T: TickSource> SysArch for PosixSys<C, T> {
    type Mailbox<M: Mail> = PosixMailbox<M>;
    type Semaphore = PosixSemaphore;
    type Mutex = PosixMutex;
    type Thread = PosixThread;

    fn mbox_new<M: Mail>(&self, capacity: usize) -> SysResult<PosixMailbox<M>> {
        self.create_mailbox(capacity).map(PosixMailbox::new)
    }

    fn mbox_post<M: Mail>(&self, mbox: &PosixMailbox<M>, msg: M) {
        if let Err(word) = self.post_word(mbox.slot(), msg.into_word()) {
            // SAFETY: the word was not queued, so this is its only owner.
            drop(unsafe { mail::reclaim::<M>(word) });
        }
    }

    fn mbox_trypost<M: Mail>(&self, mbox: &PosixMailbox<M>, msg: M) -> Result<(), TryPostError<M>> {
        self.trypost_word(mbox.slot(), msg.into_word())
            // SAFETY: the word was not queued, so this is its only owner.
            .map_err(|(error, word)| TryPostError::new(error, unsafe { mail::reclaim(word) }))
    }

    fn mbox_fetch<M: Mail>(&self, mbox: &PosixMailbox<M>, timeout_ms: u32) -> SysResult<(M, u32)> {
        let (word, elapsed) = self.fetch_word(mbox.slot(), timeout_ms)?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok((unsafe { M::from_word(word) }, elapsed))
    }

    fn mbox_tryfetch<M: Mail>(&self, mbox: &PosixMailbox<M>) -> SysResult<M> {
        let word = self.tryfetch_word(mbox.slot())?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok(unsafe { M::from_word(word) })
    }

    fn mbox_len<M: Mail>(&self, mbox: &PosixMailbox<M>) -> usize {
        self.mailbox_len(mbox.slot())
    }

    fn mbox_free<M: Mail>(&self, mbox: PosixMailbox<M>) -> Result<(), MailboxBusy<PosixMailbox<M>>> {
        self.free_mailbox(mbox.slot())
            .map_err(|pending| MailboxBusy { mailbox: mbox, pending })
    }

    fn mbox_valid<M: Mail>(&self, mbox: &PosixMailbox<M>) -> bool {
        self.mailboxes.is_live(mbox.slot())
    }

    fn sem_new_bounded(&self, count: u32, max: u32) -> SysResult<PosixSemaphore> {
        self.create_semaphore(count, max)
    }

    fn sem_wait(&self, sem: &PosixSemaphore, timeout_ms: u32) -> SysResult<u32> {
        self.wait_semaphore(sem, timeout_ms)
    }

    fn sem_signal(&self, sem: &PosixSemaphore) {
        self.signal_semaphore(sem);
    }

    fn sem_free(&self, sem: PosixSemaphore) {
        self.free_semaphore(sem);
    }

    fn sem_valid(&self, _sem: &PosixSemaphore) -> bool {
        // The handle owns the object; freeing consumes it.
        true
    }

    fn mutex_new(&self) -> SysResult<PosixMutex> {
        self.create_mutex()
    }

    fn mutex_lock(&self, mutex: &PosixMutex) -> SysResult<()> {
        self.lock_mutex(mutex)
    }

    fn mutex_unlock(&self, mutex: &PosixMutex) -> SysResult<()> {
        self.unlock_mutex(mutex)
    }

    fn mutex_free(&self, mutex: PosixMutex) {
        self.free_mutex(mutex);
    }

    fn mutex_valid(&self, _mutex: &PosixMutex) -> bool {
        // The handle owns the object; freeing consumes it.
        true
    }

    fn thread_new<F>(&self, name: &str, entry: F, stack_size: usize, priority: i32) -> SysResult<PosixThread>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_thread(name, Box::new(entry), stack_size, priority)
    }

    fn thread_state(&self, thread: &PosixThread) -> ThreadState {
        self.query_thread(thread)
    }

    fn now_ms(&self) -> u32 {
        time::now_ms(&self.clock)
    }

    fn stats(&self) -> SysStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests;
