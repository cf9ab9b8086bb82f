//! Semaphores and mutexes on host semaphores.
//!
//! A mutex is a binary semaphore that remembers its holder, so a release
//! from the wrong thread can be refused.

use std::thread::{self, ThreadId};
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use sysarch::host::HostSemaphore;
use sysarch::time::{Stopwatch, TickSource, WAIT_FOREVER};
use sysarch::{ExecContext, ResourceKind, SysError, SysResult, UsageError};

use crate::PosixSys;

#[derive(Debug)]
#[must_use = "a semaphore must be released with `sem_free`"]
pub struct PosixSemaphore {
    sem: HostSemaphore,
}

#[derive(Debug)]
#[must_use = "a mutex must be released with `mutex_free`"]
pub struct PosixMutex {
    sem: HostSemaphore,
    holder: Mutex<Option<ThreadId>>,
}

impl<C: ExecContext, T: TickSource> PosixSys<C, T> {
    pub(crate) fn create_semaphore(&self, count: u32, max: u32) -> SysResult<PosixSemaphore> {
        if count > max {
            error!("sem_new: initial count {count} above maximum {max}");
            return Err(UsageError::CountAboveMax { count, max }.into());
        }
        if !self.sem_budget.reserve(1) {
            warn!("sem_new: semaphore budget of {} exhausted", self.config.sem_max);
            self.stats.sem.on_error();
            return Err(SysError::OutOfResources(ResourceKind::Semaphore));
        }
        self.stats.sem.on_create();
        debug!("sem_new: count {count}, max {max}");
        Ok(PosixSemaphore {
            sem: HostSemaphore::bounded(count, max),
        })
    }

    pub(crate) fn wait_semaphore(&self, sem: &PosixSemaphore, timeout_ms: u32) -> SysResult<u32> {
        self.refuse_in_isr("sem_wait")?;
        let watch = Stopwatch::start(&self.clock);
        let acquired = if timeout_ms == WAIT_FOREVER {
            sem.sem.wait();
            true
        } else {
            sem.sem.wait_for(Duration::from_millis(u64::from(timeout_ms)))
        };
        if !acquired {
            return Err(SysError::Timeout);
        }
        Ok(watch.elapsed_ms(&self.clock))
    }

    pub(crate) fn signal_semaphore(&self, sem: &PosixSemaphore) {
        let waiter = sem.sem.waiters() > 0;
        if !sem.sem.post() {
            debug!("sem_signal: count already at maximum");
            return;
        }
        if waiter && self.context.in_isr() {
            self.context.request_yield();
        }
    }

    pub(crate) fn free_semaphore(&self, sem: PosixSemaphore) {
        drop(sem);
        self.sem_budget.release(1);
        self.stats.sem.on_free();
    }

    pub(crate) fn create_mutex(&self) -> SysResult<PosixMutex> {
        if !self.sem_budget.reserve(1) {
            warn!("mutex_new: semaphore budget of {} exhausted", self.config.sem_max);
            self.stats.mutex.on_error();
            return Err(SysError::OutOfResources(ResourceKind::Mutex));
        }
        self.stats.mutex.on_create();
        Ok(PosixMutex {
            sem: HostSemaphore::bounded(1, 1),
            holder: Mutex::new(None),
        })
    }

    pub(crate) fn lock_mutex(&self, mutex: &PosixMutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_lock")?;
        mutex.sem.wait();
        *mutex.holder.lock() = Some(thread::current().id());
        Ok(())
    }

    pub(crate) fn unlock_mutex(&self, mutex: &PosixMutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_unlock")?;
        let mut holder = mutex.holder.lock();
        if *holder != Some(thread::current().id()) {
            warn!("mutex_unlock: caller does not hold the mutex");
            return Err(UsageError::NotOwner.into());
        }
        *holder = None;
        drop(holder);
        mutex.sem.post();
        Ok(())
    }

    pub(crate) fn free_mutex(&self, mutex: PosixMutex) {
        drop(mutex);
        self.sem_budget.release(1);
        self.stats.mutex.on_free();
    }
}
