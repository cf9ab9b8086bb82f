//! sysarch port for tick-based RTOS kernels with heap-allocated queues.
//!
//! The kernel already provides an atomic bounded queue, counting
//! semaphores and mutexes, so this port mostly forwards. Its own work is
//! routing calls made in interrupt context to the kernel's `_from_isr`
//! variants, converting millisecond timeouts to ticks, and measuring the
//! elapsed time of blocking calls.
//!
//! The kernel is reached through [`HeapKernel`]. With the `sim` feature a
//! host simulator, [`sim::SimHeapKernel`], implements it on std threads.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

extern crate alloc;

mod kernel;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

use alloc::boxed::Box;
use core::marker::PhantomData;

use log::{debug, error, warn};
use sysarch::error::{MailboxBusy, TryPostError};
use sysarch::mail::{self, Mail};
use sysarch::sync::Arc;
use sysarch::time::{self, ms_to_ticks, Stopwatch, TickSource, WAIT_FOREVER};
use sysarch::{
    AtomicThreadState, ExecContext, IsrFlag, ResourceKind, SysArch, SysError, SysResult, SysStats,
    SysStatsSnapshot, ThreadState, UsageError, INSIDE_ISR,
};

pub use kernel::{HeapKernel, MAX_DELAY};

/// Mailbox backed by a kernel queue.
#[must_use = "a mailbox must be released with `mbox_free`"]
pub struct HeapMailbox<Q, M> {
    queue: Q,
    _mail: PhantomData<fn(M) -> M>,
}

impl<Q, M> HeapMailbox<Q, M> {
    pub fn queue(&self) -> &Q {
        &self.queue
    }
}

/// Task created through [`SysArch::thread_new`].
pub struct HeapThread<T> {
    task: T,
    state: Arc<AtomicThreadState>,
}

impl<T> HeapThread<T> {
    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn into_task(self) -> T {
        self.task
    }
}

/// The heap-RTOS port.
pub struct HeapSys<K, C = &'static IsrFlag> {
    kernel: K,
    context: C,
    stats: Arc<SysStats>,
}

impl<K: HeapKernel> HeapSys<K> {
    /// Port using the process-wide interrupt flag.
    pub fn new(kernel: K) -> Self {
        Self::with_context(kernel, &INSIDE_ISR)
    }
}

impl<K: HeapKernel, C: ExecContext> HeapSys<K, C> {
    pub fn with_context(kernel: K, context: C) -> Self {
        Self {
            kernel,
            context,
            stats: Arc::new(SysStats::new()),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    fn timeout_ticks(&self, timeout_ms: u32) -> u32 {
        if timeout_ms == WAIT_FOREVER {
            MAX_DELAY
        } else {
            ms_to_ticks(timeout_ms, self.kernel.rate_hz())
        }
    }

    fn switch_if_woken(&self, woken: bool) {
        if woken {
            self.kernel.yield_from_isr();
        }
    }

    fn refuse_in_isr(&self, op: &str) -> SysResult<()> {
        if self.context.in_isr() {
            error!("{op}: suspending call from interrupt context");
            return Err(UsageError::BlockingInIsr.into());
        }
        Ok(())
    }

    fn exhausted(&self, kind: ResourceKind) -> SysError {
        warn!("{kind}: kernel heap refused allocation");
        self.stats.counter(kind).on_error();
        SysError::OutOfResources(kind)
    }

    /// Non-blocking enqueue through the path matching the calling context.
    fn send_now(&self, queue: &K::Queue, word: usize) -> bool {
        if self.context.in_isr() {
            let mut woken = false;
            let sent = self.kernel.queue_send_from_isr(queue, word, &mut woken);
            self.switch_if_woken(woken);
            sent
        } else {
            self.kernel.queue_send(queue, word, 0)
        }
    }
}

impl<K: HeapKernel, C: ExecContext> SysArch for HeapSys<K, C> {
    type Mailbox<M: Mail> = HeapMailbox<K::Queue, M>;
    type Semaphore = K::Semaphore;
    type Mutex = K::Mutex;
    type Thread = HeapThread<K::Task>;

    fn mbox_new<M: Mail>(&self, capacity: usize) -> SysResult<Self::Mailbox<M>> {
        let max = self.kernel.queue_length_max();
        if capacity == 0 || capacity > max {
            warn!("mbox_new: capacity {capacity} outside 1..={max}");
            self.stats.mbox.on_error();
            return Err(SysError::OutOfResources(ResourceKind::Mailbox));
        }
        let queue = self
            .kernel
            .queue_create(capacity)
            .ok_or_else(|| self.exhausted(ResourceKind::Mailbox))?;
        self.stats.mbox.on_create();
        debug!("mbox_new: queue of {capacity} messages");
        Ok(HeapMailbox {
            queue,
            _mail: PhantomData,
        })
    }

    fn mbox_post<M: Mail>(&self, mbox: &Self::Mailbox<M>, msg: M) {
        let word = msg.into_word();
        let sent = if self.context.in_isr() {
            self.send_now(&mbox.queue, word)
        } else {
            self.kernel.queue_send(&mbox.queue, word, MAX_DELAY)
        };
        if !sent {
            warn!("mbox_post: queue full, message dropped");
            self.stats.mbox.on_error();
            // SAFETY: the kernel did not take the word.
            drop(unsafe { mail::reclaim::<M>(word) });
        }
    }

    fn mbox_trypost<M: Mail>(&self, mbox: &Self::Mailbox<M>, msg: M) -> Result<(), TryPostError<M>> {
        let word = msg.into_word();
        if self.send_now(&mbox.queue, word) {
            return Ok(());
        }
        debug!("mbox_trypost: queue full");
        // SAFETY: the kernel did not take the word.
        Err(TryPostError::full(unsafe { mail::reclaim(word) }))
    }

    fn mbox_fetch<M: Mail>(&self, mbox: &Self::Mailbox<M>, timeout_ms: u32) -> SysResult<(M, u32)> {
        self.refuse_in_isr("mbox_fetch")?;
        let watch = Stopwatch::start(&self.kernel);
        let word = self
            .kernel
            .queue_receive(&mbox.queue, self.timeout_ticks(timeout_ms))
            .ok_or(SysError::Timeout)?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok((unsafe { M::from_word(word) }, watch.elapsed_ms(&self.kernel)))
    }

    fn mbox_tryfetch<M: Mail>(&self, mbox: &Self::Mailbox<M>) -> SysResult<M> {
        let word = if self.context.in_isr() {
            let mut woken = false;
            let word = self.kernel.queue_receive_from_isr(&mbox.queue, &mut woken);
            self.switch_if_woken(woken);
            word
        } else {
            self.kernel.queue_receive(&mbox.queue, 0)
        };
        let word = word.ok_or(SysError::Empty)?;
        // SAFETY: only words posted through this typed handle are queued.
        Ok(unsafe { M::from_word(word) })
    }

    fn mbox_len<M: Mail>(&self, mbox: &Self::Mailbox<M>) -> usize {
        self.kernel.queue_messages_waiting(&mbox.queue)
    }

    fn mbox_free<M: Mail>(&self, mbox: Self::Mailbox<M>) -> Result<(), MailboxBusy<Self::Mailbox<M>>> {
        let pending = self.kernel.queue_messages_waiting(&mbox.queue);
        if pending > 0 {
            error!("mbox_free: queue still holds {pending} message(s)");
            self.stats.mbox.on_error();
            return Err(MailboxBusy { mailbox: mbox, pending });
        }
        self.kernel.queue_delete(mbox.queue);
        self.stats.mbox.on_free();
        Ok(())
    }

    fn mbox_valid<M: Mail>(&self, _mbox: &Self::Mailbox<M>) -> bool {
        // The handle owns the object; freeing consumes it.
        true
    }

    fn sem_new_bounded(&self, count: u32, max: u32) -> SysResult<K::Semaphore> {
        if count > max {
            error!("sem_new: initial count {count} above maximum {max}");
            return Err(UsageError::CountAboveMax { count, max }.into());
        }
        let sem = self
            .kernel
            .semaphore_create(max, count)
            .ok_or_else(|| self.exhausted(ResourceKind::Semaphore))?;
        self.stats.sem.on_create();
        Ok(sem)
    }

    fn sem_wait(&self, sem: &K::Semaphore, timeout_ms: u32) -> SysResult<u32> {
        self.refuse_in_isr("sem_wait")?;
        let watch = Stopwatch::start(&self.kernel);
        if !self.kernel.semaphore_take(sem, self.timeout_ticks(timeout_ms)) {
            return Err(SysError::Timeout);
        }
        Ok(watch.elapsed_ms(&self.kernel))
    }

    fn sem_signal(&self, sem: &K::Semaphore) {
        let given = if self.context.in_isr() {
            let mut woken = false;
            let given = self.kernel.semaphore_give_from_isr(sem, &mut woken);
            self.switch_if_woken(woken);
            given
        } else {
            self.kernel.semaphore_give(sem)
        };
        if !given {
            debug!("sem_signal: count already at maximum");
        }
    }

    fn sem_free(&self, sem: K::Semaphore) {
        self.kernel.semaphore_delete(sem);
        self.stats.sem.on_free();
    }

    fn sem_valid(&self, _sem: &K::Semaphore) -> bool {
        // The handle owns the object; freeing consumes it.
        true
    }

    fn mutex_new(&self) -> SysResult<K::Mutex> {
        let mutex = self
            .kernel
            .mutex_create()
            .ok_or_else(|| self.exhausted(ResourceKind::Mutex))?;
        self.stats.mutex.on_create();
        Ok(mutex)
    }

    fn mutex_lock(&self, mutex: &K::Mutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_lock")?;
        if self.kernel.mutex_take(mutex, MAX_DELAY) {
            Ok(())
        } else {
            Err(SysError::Timeout)
        }
    }

    fn mutex_unlock(&self, mutex: &K::Mutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_unlock")?;
        if self.kernel.mutex_give(mutex) {
            Ok(())
        } else {
            warn!("mutex_unlock: caller does not hold the mutex");
            Err(UsageError::NotOwner.into())
        }
    }

    fn mutex_free(&self, mutex: K::Mutex) {
        self.kernel.mutex_delete(mutex);
        self.stats.mutex.on_free();
    }

    fn mutex_valid(&self, _mutex: &K::Mutex) -> bool {
        // The handle owns the object; freeing consumes it.
        true
    }

    fn thread_new<F>(
        &self,
        name: &str,
        entry: F,
        stack_size: usize,
        priority: i32,
    ) -> SysResult<HeapThread<K::Task>>
    where
        F: FnOnce() + Send + 'static,
    {
        let top = self.kernel.max_priorities().saturating_sub(1);
        let native = priority.clamp(0, i32::try_from(top).unwrap_or(i32::MAX)) as u32;

        let state = Arc::new(AtomicThreadState::new(ThreadState::Created));
        let trampoline = {
            let state = Arc::clone(&state);
            let stats = Arc::clone(&self.stats);
            move || {
                state.store(ThreadState::Running);
                entry();
                state.store(ThreadState::Terminated);
                stats.thread.on_free();
            }
        };

        self.stats.thread.on_create();
        match self.kernel.task_create(name, Box::new(trampoline), stack_size, native) {
            Some(task) => {
                debug!("thread_new: `{name}` at native priority {native}");
                Ok(HeapThread { task, state })
            }
            None => {
                self.stats.thread.on_free();
                Err(self.exhausted(ResourceKind::Thread))
            }
        }
    }

    fn thread_state(&self, thread: &HeapThread<K::Task>) -> ThreadState {
        thread.state.load()
    }

    fn now_ms(&self) -> u32 {
        time::now_ms(&self.kernel)
    }

    fn stats(&self) -> SysStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests;
