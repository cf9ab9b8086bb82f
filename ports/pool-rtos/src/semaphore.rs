//! Semaphores and mutexes backed by pooled kernel control blocks.

use log::{debug, error, warn};
use sysarch::pool::SlotId;
use sysarch::time::Stopwatch;
use sysarch::{ExecContext, ResourceKind, SysError, SysResult, UsageError};

use crate::kernel::{OsError, PoolKernel};
use crate::PoolSys;

#[derive(Debug)]
#[must_use = "a semaphore must be released with `sem_free`"]
pub struct PoolSemaphore {
    slot: SlotId,
}

impl PoolSemaphore {
    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }
}

#[derive(Debug)]
#[must_use = "a mutex must be released with `mutex_free`"]
pub struct PoolMutex {
    slot: SlotId,
}

impl PoolMutex {
    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }
}

impl<K: PoolKernel + 'static, C: ExecContext> PoolSys<K, C> {
    pub(crate) fn create_semaphore(&self, count: u32, max: u32) -> SysResult<PoolSemaphore> {
        if count > max {
            error!("sem_new: initial count {count} above maximum {max}");
            return Err(UsageError::CountAboveMax { count, max }.into());
        }
        let shared = &*self.shared;
        let Some(slot) = shared.sems.acquire() else {
            return Err(self.exhausted(ResourceKind::Semaphore, "semaphore pool empty"));
        };
        let sem = shared.sems.get(slot).ok_or(SysError::InvalidHandle)?;
        if let Err(err) = shared.kernel.sem_create(sem, "lwip_sem", count, max) {
            shared.sems.release(slot);
            error!("sem_new: kernel create failed: {err}");
            return Err(self.exhausted(ResourceKind::Semaphore, "kernel refused semaphore"));
        }
        shared.stats.sem.on_create();
        debug!("sem_new: slot {}, count {count}, max {max}", slot.index());
        Ok(PoolSemaphore { slot })
    }

    pub(crate) fn wait_semaphore(&self, sem: &PoolSemaphore, timeout_ms: u32) -> SysResult<u32> {
        self.refuse_in_isr("sem_wait")?;
        let shared = &*self.shared;
        let sem = shared.sems.get(sem.slot).ok_or(SysError::InvalidHandle)?;

        let watch = Stopwatch::start(&shared.kernel);
        shared.kernel.sem_pend(sem, self.timeout_ticks(timeout_ms))?;
        Ok(watch.elapsed_ms(&shared.kernel))
    }

    pub(crate) fn signal_semaphore(&self, sem: &PoolSemaphore) {
        let shared = &*self.shared;
        let Some(sem) = shared.sems.get(sem.slot) else {
            error!("sem_signal: stale semaphore handle");
            return;
        };
        match shared.kernel.sem_post(sem, self.post_opt()) {
            Ok(()) => self.after_post(),
            Err(OsError::SemOverflow) => debug!("sem_signal: count already at maximum"),
            Err(err) => error!("sem_signal: {err}"),
        }
    }

    pub(crate) fn free_semaphore(&self, sem: PoolSemaphore) {
        let shared = &*self.shared;
        if let Some(block) = shared.sems.get(sem.slot) {
            if let Err(err) = shared.kernel.sem_del(block) {
                error!("sem_free: kernel delete failed: {err}");
            }
        }
        if shared.sems.release(sem.slot) {
            shared.stats.sem.on_free();
        }
    }

    pub(crate) fn create_mutex(&self) -> SysResult<PoolMutex> {
        let shared = &*self.shared;
        let Some(slot) = shared.mutexes.acquire() else {
            return Err(self.exhausted(ResourceKind::Mutex, "mutex pool empty"));
        };
        let mutex = shared.mutexes.get(slot).ok_or(SysError::InvalidHandle)?;
        if let Err(err) = shared.kernel.mutex_create(mutex, "lwip_mutex") {
            shared.mutexes.release(slot);
            error!("mutex_new: kernel create failed: {err}");
            return Err(self.exhausted(ResourceKind::Mutex, "kernel refused mutex"));
        }
        shared.stats.mutex.on_create();
        Ok(PoolMutex { slot })
    }

    pub(crate) fn lock_mutex(&self, mutex: &PoolMutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_lock")?;
        let shared = &*self.shared;
        let mutex = shared.mutexes.get(mutex.slot).ok_or(SysError::InvalidHandle)?;
        shared.kernel.mutex_pend(mutex, 0)?;
        Ok(())
    }

    pub(crate) fn unlock_mutex(&self, mutex: &PoolMutex) -> SysResult<()> {
        self.refuse_in_isr("mutex_unlock")?;
        let shared = &*self.shared;
        let mutex = shared.mutexes.get(mutex.slot).ok_or(SysError::InvalidHandle)?;
        shared.kernel.mutex_post(mutex).map_err(|err| {
            warn!("mutex_unlock: {err}");
            SysError::from(err)
        })
    }

    pub(crate) fn free_mutex(&self, mutex: PoolMutex) {
        let shared = &*self.shared;
        if let Some(block) = shared.mutexes.get(mutex.slot) {
            if let Err(err) = shared.kernel.mutex_del(block) {
                error!("mutex_free: kernel delete failed: {err}");
            }
        }
        if shared.mutexes.release(mutex.slot) {
            shared.stats.mutex.on_free();
        }
    }
}
