//! sysarch port for tick-based RTOS kernels that only offer static pools.
//!
//! Kernels of this kind never allocate: every queue, semaphore, mutex and
//! task control block is memory the caller hands to the kernel. This port
//! therefore owns one fixed [`SlotPool`] per object kind, plus a pool of
//! thread stacks, all sized by [`PoolConfig`] and created once when
//! [`PoolSys`] is built. Exhaustion is reported immediately and never
//! blocks.
//!
//! A mailbox is a kernel queue paired with a "space" semaphore counting
//! free slots, so a task-context post can block until the queue has room
//! while an interrupt-context post only takes a slot if one is free.
//!
//! The kernel is reached through [`PoolKernel`]. With the `sim` feature a
//! host simulator, [`sim::SimPoolKernel`], implements it on std threads.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

extern crate alloc;

mod config;
mod kernel;
mod mailbox;
mod priority;
mod semaphore;
mod thread;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

use alloc::boxed::Box;

use log::{error, warn};
use sysarch::error::{MailboxBusy, TryPostError};
use sysarch::mail::{self, Mail};
use sysarch::pool::{PoolStats, SlotPool};
use sysarch::sync::Arc;
use sysarch::time::{self, ms_to_ticks, TickSource, WAIT_FOREVER};
use sysarch::{
    ExecContext, IsrFlag, ResourceKind, SysArch, SysError, SysResult, SysStats, SysStatsSnapshot,
    ThreadState, UsageError, INSIDE_ISR,
};

pub use config::{PoolConfig, PoolConfigBuilder};
pub use kernel::{OsError, PoolKernel, PostOpt, StackRegion};
pub use mailbox::PoolMailbox;
pub use priority::PriorityMap;
pub use semaphore::{PoolMutex, PoolSemaphore};
pub use thread::PoolThread;

use mailbox::MboxBlock;
use thread::{StackBlock, Tcb};

/// Occupancy of every arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    pub tcb: PoolStats,
    pub stack: PoolStats,
    pub mbox: PoolStats,
    pub sem: PoolStats,
    pub mutex: PoolStats,
}

/// State shared with running tasks.
struct Shared<K: PoolKernel> {
    kernel: K,
    config: PoolConfig,
    priorities: PriorityMap,
    tcbs: SlotPool<Tcb<K>>,
    stacks: SlotPool<StackBlock<K::StackWord>>,
    mboxes: SlotPool<MboxBlock<K>>,
    sems: SlotPool<K::Semaphore>,
    mutexes: SlotPool<K::Mutex>,
    stats: SysStats,
}

/// The pool-constrained port.
pub struct PoolSys<K: PoolKernel, C = &'static IsrFlag> {
    shared: Arc<Shared<K>>,
    context: C,
}

impl<K: PoolKernel + 'static> PoolSys<K> {
    /// Port using the process-wide interrupt flag.
    pub fn new(kernel: K, config: PoolConfig) -> Self {
        Self::with_context(kernel, config, &INSIDE_ISR)
    }
}

impl<K: PoolKernel + 'static, C: ExecContext> PoolSys<K, C> {
    /// Creates every pool up front.
    pub fn with_context(kernel: K, config: PoolConfig, context: C) -> Self {
        let priorities =
            PriorityMap::new(kernel.prio_max(), config.reserved_high, config.reserved_low);
        let stack_words = config.stack_words_max;
        log::debug!(
            "pool sys init: {} tcbs, {} stacks of {} words, {} mailboxes, {} semaphores, {} mutexes",
            config.tcb_count,
            config.stack_count,
            stack_words,
            config.mbox_count,
            config.sem_count,
            config.mutex_count
        );
        let shared = Shared {
            tcbs: SlotPool::new("tcb", config.tcb_count, Tcb::default),
            stacks: SlotPool::new("stack", config.stack_count, || StackBlock::new(stack_words)),
            mboxes: SlotPool::new("mbox", config.mbox_count, MboxBlock::default),
            sems: SlotPool::new("sem", config.sem_count, <K::Semaphore as Default>::default),
            mutexes: SlotPool::new("mutex", config.mutex_count, <K::Mutex as Default>::default),
            stats: SysStats::new(),
            kernel,
            config,
            priorities,
        };
        Self {
            shared: Arc::new(shared),
            context,
        }
    }

    pub fn kernel(&self) -> &K {
        &self.shared.kernel
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn priorities(&self) -> PriorityMap {
        self.shared.priorities
    }

    pub fn pool_usage(&self) -> PoolUsage {
        let shared = &self.shared;
        PoolUsage {
            tcb: shared.tcbs.stats(),
            stack: shared.stacks.stats(),
            mbox: shared.mboxes.stats(),
            sem: shared.sems.stats(),
            mutex: shared.mutexes.stats(),
        }
    }

    fn timeout_ticks(&self, timeout_ms: u32) -> u32 {
        if timeout_ms == WAIT_FOREVER {
            0
        } else {
            ms_to_ticks(timeout_ms, self.shared.kernel.rate_hz())
        }
    }

    /// Posts from an interrupt defer scheduling to the interrupt exit.
    fn post_opt(&self) -> PostOpt {
        if self.context.in_isr() {
            PostOpt::NO_SCHED
        } else {
            PostOpt::DEFAULT
        }
    }

    fn after_post(&self) {
        if self.context.in_isr() {
            self.context.request_yield();
        }
    }

    fn refuse_in_isr(&self, op: &str) -> SysResult<()> {
        if self.context.in_isr() {
            error!("{op}: suspending call from interrupt context");
            return Err(UsageError::BlockingInIsr.into());
        }
        Ok(())
    }

    fn exhausted(&self, kind: ResourceKind, reason: &str) -> SysError {
        warn!("{kind}: {reason}");
        self.shared.stats.counter(kind).on_error();
        SysError::OutOfResources(kind)
    }
}

impl<K: PoolKernel + 'static, C: ExecContext> SysArch for PoolSys<K, C> {
    type Mailbox<M: Mail> = PoolMailbox<M>;
    type Semaphore = PoolSemaphore;
    type Mutex = PoolMutex;
    type Thread = PoolThread;

    fn mbox_new<M: Mail>(&self, capacity: usize) -> SysResult<PoolMailbox<M>> {
        self.create_mailbox(capacity).map(PoolMailbox::new)
    }

    fn mbox_post<M: Mail>(&self, mbox: &PoolMailbox<M>, msg: M) {
        if let Err(word) = self.post_word(mbox.slot(), msg.into_word()) {
            // SAFETY: the word was not queued, so this is its only owner.
            drop(unsafe { mail::reclaim::<M>(word) });
        }
    }

    fn mbox_trypost<M: Mail>(&self, mbox: &PoolMailbox<M>, msg: M) -> Result<(), TryPostError<M>> {
        self.trypost_word(mbox.slot(), msg.into_word())
            // SAFETY: the word was not queued, so this is its only owner.
            .map_err(|(error, word)| TryPostError::new(error, unsafe { mail::reclaim(word) }))
    }

    fn mbox_fetch<M: Mail>(&self, mbox: &PoolMailbox<M>, timeout_ms: u32) -> SysResult<(M, u32)> {
        let (word, elapsed) = self.fetch_word(mbox.slot(), timeout_ms)?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok((unsafe { M::from_word(word) }, elapsed))
    }

    fn mbox_tryfetch<M: Mail>(&self, mbox: &PoolMailbox<M>) -> SysResult<M> {
        let word = self.tryfetch_word(mbox.slot())?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok(unsafe { M::from_word(word) })
    }

    fn mbox_len<M: Mail>(&self, mbox: &PoolMailbox<M>) -> usize {
        self.mailbox_len(mbox.slot())
    }

    fn mbox_free<M: Mail>(&self, mbox: PoolMailbox<M>) -> Result<(), MailboxBusy<PoolMailbox<M>>> {
        self.free_mailbox(mbox.slot())
            .map_err(|pending| MailboxBusy { mailbox: mbox, pending })
    }

    fn mbox_valid<M: Mail>(&self, mbox: &PoolMailbox<M>) -> bool {
        self.shared.mboxes.is_live(mbox.slot())
    }

    fn sem_new_bounded(&self, count: u32, max: u32) -> SysResult<PoolSemaphore> {
        self.create_semaphore(count, max)
    }

    fn sem_wait(&self, sem: &PoolSemaphore, timeout_ms: u32) -> SysResult<u32> {
        self.wait_semaphore(sem, timeout_ms)
    }

    fn sem_signal(&self, sem: &PoolSemaphore) {
        self.signal_semaphore(sem);
    }

    fn sem_free(&self, sem: PoolSemaphore) {
        self.free_semaphore(sem);
    }

    fn sem_valid(&self, sem: &PoolSemaphore) -> bool {
        self.shared.sems.is_live(sem.slot())
    }

    fn mutex_new(&self) -> SysResult<PoolMutex> {
        self.create_mutex()
    }

    fn mutex_lock(&self, mutex: &PoolMutex) -> SysResult<()> {
        self.lock_mutex(mutex)
    }

    fn mutex_unlock(&self, mutex: &PoolMutex) -> SysResult<()> {
        self.unlock_mutex(mutex)
    }

    fn mutex_free(&self, mutex: PoolMutex) {
        self.free_mutex(mutex);
    }

    fn mutex_valid(&self, mutex: &PoolMutex) -> bool {
        self.shared.mutexes.is_live(mutex.slot())
    }

    fn thread_new<F>(&self, name: &str, entry: F, stack_size: usize, priority: i32) -> SysResult<PoolThread>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_thread(name, Box::new(entry), stack_size, priority)
    }

    fn thread_delete(&self, thread: PoolThread) -> SysResult<()> {
        self.delete_thread(thread)
    }

    fn thread_state(&self, thread: &PoolThread) -> ThreadState {
        self.query_thread(thread)
    }

    fn now_ms(&self) -> u32 {
        time::now_ms(&self.shared.kernel)
    }

    fn stats(&self) -> SysStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

#[cfg(test)]
mod tests;
