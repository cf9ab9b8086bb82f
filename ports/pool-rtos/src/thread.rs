//! Threads on pooled control blocks and stacks.
//!
//! A thread holds one TCB and one stack until it is deleted or, once its
//! entry has returned, until a later `thread_new` finds a pool empty and
//! sweeps finished threads back into them.

use alloc::boxed::Box;
use alloc::vec;
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use log::{debug, error, warn};
use sysarch::pool::SlotId;
use sysarch::sync::{Arc, Mutex};
use sysarch::{
    AtomicThreadState, ExecContext, ResourceKind, SysError, SysResult, ThreadEntry, ThreadState,
    UsageError,
};

use crate::kernel::{OsError, PoolKernel, StackRegion};
use crate::PoolSys;

/// One stack of `stack_words_max` words.
pub(crate) struct StackBlock<W> {
    words: UnsafeCell<Box<[W]>>,
}

// SAFETY: the words are only touched through `prepare`, which requires the
// caller to own the slot exclusively.
unsafe impl<W: Send> Sync for StackBlock<W> {}

impl<W: Copy + Default> StackBlock<W> {
    pub(crate) fn new(words: usize) -> Self {
        Self {
            words: UnsafeCell::new(vec![W::default(); words].into_boxed_slice()),
        }
    }

    /// Clears the stack and hands out its first `len` words.
    ///
    /// # Safety
    ///
    /// The caller must have just acquired this slot, so no task runs on it.
    pub(crate) unsafe fn prepare(&self, len: usize) -> StackRegion<W> {
        let words = &mut *self.words.get();
        words.fill(W::default());
        let len = len.min(words.len());
        StackRegion::new(NonNull::new_unchecked(words.as_mut_ptr()), len)
    }
}

/// Thread control block plus the stack slot it runs on.
pub(crate) struct Tcb<K: PoolKernel> {
    task: K::Task,
    stack: Mutex<Option<SlotId>>,
    state: AtomicThreadState,
}

impl<K: PoolKernel> Default for Tcb<K> {
    fn default() -> Self {
        Self {
            task: Default::default(),
            stack: Mutex::new(None),
            state: AtomicThreadState::default(),
        }
    }
}

/// Handle to a thread created by [`PoolSys`].
#[derive(Debug)]
pub struct PoolThread {
    tcb: SlotId,
}

impl<K: PoolKernel + 'static, C: ExecContext> PoolSys<K, C> {
    /// The kernel task block behind a live thread.
    pub fn task(&self, thread: &PoolThread) -> Option<&K::Task> {
        self.shared.tcbs.get(thread.tcb).map(|tcb| &tcb.task)
    }

    pub(crate) fn spawn_thread(
        &self,
        name: &str,
        entry: ThreadEntry,
        stack_size: usize,
        priority: i32,
    ) -> SysResult<PoolThread> {
        let shared = &*self.shared;
        let max = shared.config.stack_words_max;
        if stack_size > max {
            error!("thread_new: `{name}` wants {stack_size} stack words, pool stacks hold {max}");
            return Err(UsageError::StackTooLarge { requested: stack_size, max }.into());
        }

        let tcb_id = match shared.tcbs.acquire() {
            Some(id) => id,
            None => {
                self.reclaim_finished();
                match shared.tcbs.acquire() {
                    Some(id) => id,
                    None => return Err(self.exhausted(ResourceKind::Thread, "tcb pool empty")),
                }
            }
        };
        let Some(tcb) = shared.tcbs.get(tcb_id) else {
            return Err(SysError::InvalidHandle);
        };
        // A recycled block still reads Terminated; keep the sweep off it.
        tcb.state.store(ThreadState::Created);

        let stack_id = match shared.stacks.acquire() {
            Some(id) => id,
            None => {
                self.reclaim_finished();
                match shared.stacks.acquire() {
                    Some(id) => id,
                    None => {
                        shared.tcbs.release(tcb_id);
                        return Err(self.exhausted(ResourceKind::Stack, "stack pool empty"));
                    }
                }
            }
        };
        let Some(stack) = shared.stacks.get(stack_id) else {
            shared.stacks.release(stack_id);
            shared.tcbs.release(tcb_id);
            return Err(SysError::InvalidHandle);
        };

        let words = if stack_size == 0 { max } else { stack_size };
        // SAFETY: `stack_id` was acquired above and no task uses it yet.
        let region = unsafe { stack.prepare(words) };
        *tcb.stack.lock() = Some(stack_id);
        let native = shared.priorities.remap(priority);

        let trampoline = {
            let shared = Arc::clone(&self.shared);
            move || {
                if let Some(tcb) = shared.tcbs.get(tcb_id) {
                    tcb.state.store(ThreadState::Running);
                }
                entry();
                if let Some(tcb) = shared.tcbs.get(tcb_id) {
                    tcb.state.store(ThreadState::Terminated);
                }
            }
        };

        match shared.kernel.task_create(&tcb.task, name, Box::new(trampoline), native, region) {
            Ok(()) => {
                shared.stats.thread.on_create();
                debug!(
                    "thread_new: `{name}` on tcb {}, stack {}, native priority {native}",
                    tcb_id.index(),
                    stack_id.index()
                );
                Ok(PoolThread { tcb: tcb_id })
            }
            Err(err) => {
                error!("thread_new: `{name}` not created: {err}");
                *tcb.stack.lock() = None;
                shared.stacks.release(stack_id);
                shared.tcbs.release(tcb_id);
                shared.stats.thread.on_error();
                Err(SysError::OutOfResources(ResourceKind::Thread))
            }
        }
    }

    /// Returns the TCB and stack of every thread whose entry has returned.
    ///
    /// A finished entry does not mean the kernel is done with the task: it
    /// may still be on its pooled stack, on the way out. Each finished task
    /// is deleted from the kernel first and its slots are reused only after
    /// the kernel confirms it is gone. `ObjNotCreated` means the kernel had
    /// already dropped it.
    pub fn reclaim_finished(&self) -> usize {
        let shared = &*self.shared;
        let mut reclaimed = 0;
        for id in shared.tcbs.live_ids() {
            let Some(tcb) = shared.tcbs.get(id) else {
                continue;
            };
            if tcb.state.load() != ThreadState::Terminated {
                continue;
            }
            match shared.kernel.task_del(&tcb.task) {
                Ok(()) | Err(OsError::ObjNotCreated) => {}
                Err(err) => {
                    warn!("thread_new: finished task on tcb {} kept: {err}", id.index());
                    continue;
                }
            }
            if self.release_thread(id) {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            debug!("thread_new: reclaimed {reclaimed} finished thread(s)");
        }
        reclaimed
    }

    fn release_thread(&self, id: SlotId) -> bool {
        let shared = &*self.shared;
        let Some(tcb) = shared.tcbs.get(id) else {
            return false;
        };
        if let Some(stack) = tcb.stack.lock().take() {
            shared.stacks.release(stack);
        }
        if !shared.tcbs.release(id) {
            return false;
        }
        shared.stats.thread.on_free();
        true
    }

    pub(crate) fn delete_thread(&self, thread: PoolThread) -> SysResult<()> {
        let shared = &*self.shared;
        let tcb = shared.tcbs.get(thread.tcb).ok_or(SysError::InvalidHandle)?;
        if !tcb.state.load().is_finished() {
            shared.kernel.task_del(&tcb.task).map_err(|err| {
                error!("thread_delete: {err}");
                SysError::from(err)
            })?;
        }
        tcb.state.store(ThreadState::Deleted);
        self.release_thread(thread.tcb);
        debug!("thread_delete: tcb {} released", thread.tcb.index());
        Ok(())
    }

    pub(crate) fn query_thread(&self, thread: &PoolThread) -> ThreadState {
        self.shared
            .tcbs
            .get(thread.tcb)
            .map_or(ThreadState::Terminated, |tcb| tcb.state.load())
    }
}
