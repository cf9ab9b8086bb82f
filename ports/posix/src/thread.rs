//! Thread table and host thread spawning.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use parking_lot::Mutex;
use sysarch::pool::{SlotId, SlotPool};
use sysarch::time::TickSource;
use sysarch::{
    thread_name, AtomicThreadState, ExecContext, ResourceKind, SysError, SysResult, SysStats,
    ThreadEntry, ThreadName, ThreadState, UsageError,
};

use crate::{PosixError, PosixSys};

/// One entry of the thread table.
#[derive(Debug, Default)]
pub(crate) struct ThreadSlot {
    name: Mutex<ThreadName>,
    priority: AtomicI32,
    state: AtomicThreadState,
}

/// Handle to a thread created by the POSIX port.
#[derive(Debug)]
pub struct PosixThread {
    slot: SlotId,
    handle: JoinHandle<()>,
}

impl PosixThread {
    /// Waits for the entry closure to return.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// Frees the table entry when the thread finishes or fails to start.
struct ThreadExit {
    table: Arc<SlotPool<ThreadSlot>>,
    stats: Arc<SysStats>,
    id: SlotId,
}

impl Drop for ThreadExit {
    fn drop(&mut self) {
        if let Some(slot) = self.table.get(self.id) {
            slot.state.store(ThreadState::Terminated);
        }
        self.table.release(self.id);
        self.stats.thread.on_free();
    }
}

impl<C: ExecContext, T: TickSource> PosixSys<C, T> {
    pub(crate) fn spawn_thread(
        &self,
        name: &str,
        entry: ThreadEntry,
        stack_size: usize,
        priority: i32,
    ) -> SysResult<PosixThread> {
        let max = self.config.stack_size_max;
        if stack_size > max {
            error!("thread_new: stack of {stack_size} bytes for `{name}` exceeds {max}");
            return Err(UsageError::StackTooLarge { requested: stack_size, max }.into());
        }
        let Some(id) = self.threads.acquire() else {
            warn!("thread_new: thread table full, `{name}` not created");
            self.stats.thread.on_error();
            return Err(SysError::OutOfResources(ResourceKind::Thread));
        };
        if let Some(slot) = self.threads.get(id) {
            *slot.name.lock() = thread_name(name);
            slot.priority.store(priority, Ordering::Relaxed);
            slot.state.store(ThreadState::Created);
        }
        self.stats.thread.on_create();

        let exit = ThreadExit {
            table: Arc::clone(&self.threads),
            stats: Arc::clone(&self.stats),
            id,
        };
        let trampoline = move || {
            if let Some(slot) = exit.table.get(exit.id) {
                slot.state.store(ThreadState::Running);
            }
            entry();
            drop(exit);
        };

        let spawned = thread::Builder::new()
            .name(name.to_owned())
            .stack_size(stack_size.max(self.config.host_stack_min))
            .spawn(trampoline)
            .map_err(PosixError::from);
        match spawned {
            Ok(handle) => {
                debug!("thread_new: `{name}` in slot {} at priority {priority}", id.index());
                Ok(PosixThread { slot: id, handle })
            }
            Err(err) => {
                error!("thread_new: {err}");
                self.stats.thread.on_error();
                Err(err.into())
            }
        }
    }

    pub(crate) fn query_thread(&self, thread: &PosixThread) -> ThreadState {
        self.threads
            .get(thread.slot)
            .map_or(ThreadState::Terminated, |slot| slot.state.load())
    }

    /// Name and requested priority of a thread that has not finished yet.
    pub fn thread_info(&self, thread: &PosixThread) -> Option<(ThreadName, i32)> {
        self.threads
            .get(thread.slot)
            .map(|slot| (slot.name.lock().clone(), slot.priority.load(Ordering::Relaxed)))
    }
}
