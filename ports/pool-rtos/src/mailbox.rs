//! Mailboxes: a kernel queue plus a semaphore counting free slots.

use core::fmt;
use core::marker::PhantomData;

use log::{debug, error, warn};
use sysarch::pool::SlotId;
use sysarch::time::Stopwatch;
use sysarch::{ExecContext, ResourceKind, SysError, SysResult};

use crate::kernel::PoolKernel;
use crate::PoolSys;

/// Control blocks behind one mailbox.
pub(crate) struct MboxBlock<K: PoolKernel> {
    queue: K::Queue,
    space: K::Semaphore,
}

impl<K: PoolKernel> Default for MboxBlock<K> {
    fn default() -> Self {
        Self {
            queue: Default::default(),
            space: Default::default(),
        }
    }
}

/// Handle to a mailbox of `M` messages.
#[must_use = "a mailbox must be released with `mbox_free`"]
pub struct PoolMailbox<M> {
    slot: SlotId,
    _mail: PhantomData<fn(M) -> M>,
}

impl<M> PoolMailbox<M> {
    pub(crate) fn new(slot: SlotId) -> Self {
        Self {
            slot,
            _mail: PhantomData,
        }
    }

    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }
}

impl<M> fmt::Debug for PoolMailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolMailbox").field("slot", &self.slot).finish()
    }
}

impl<K: PoolKernel + 'static, C: ExecContext> PoolSys<K, C> {
    fn mbox_block(&self, id: SlotId) -> SysResult<&MboxBlock<K>> {
        self.shared.mboxes.get(id).ok_or(SysError::InvalidHandle)
    }

    pub(crate) fn create_mailbox(&self, capacity: usize) -> SysResult<SlotId> {
        let shared = &*self.shared;
        if capacity == 0 || capacity > shared.config.mbox_capacity_max {
            return Err(self.exhausted(ResourceKind::Mailbox, "capacity outside the supported range"));
        }
        let Some(id) = shared.mboxes.acquire() else {
            return Err(self.exhausted(ResourceKind::Mailbox, "mailbox pool empty"));
        };
        let block = self.mbox_block(id)?;
        let slots = u32::try_from(capacity).unwrap_or(u32::MAX);

        if let Err(err) = shared.kernel.q_create(&block.queue, "lwip_mbox", capacity) {
            shared.mboxes.release(id);
            error!("mbox_new: queue create failed: {err}");
            return Err(self.exhausted(ResourceKind::Mailbox, "kernel refused queue"));
        }
        if let Err(err) = shared.kernel.sem_create(&block.space, "lwip_mbox_space", slots, slots) {
            let _ = shared.kernel.q_del(&block.queue);
            shared.mboxes.release(id);
            error!("mbox_new: space semaphore create failed: {err}");
            return Err(self.exhausted(ResourceKind::Mailbox, "kernel refused semaphore"));
        }

        shared.stats.mbox.on_create();
        debug!("mbox_new: slot {} holds {} messages", id.index(), capacity);
        Ok(id)
    }

    /// Queues a word whose slot was already taken from `space`.
    fn enqueue(&self, block: &MboxBlock<K>, word: usize) -> Result<(), usize> {
        let kernel = &self.shared.kernel;
        match kernel.q_post(&block.queue, word, self.post_opt()) {
            Ok(()) => {
                self.after_post();
                Ok(())
            }
            Err(err) => {
                error!("mbox_post: queue post failed: {err}");
                let _ = kernel.sem_post(&block.space, self.post_opt());
                self.shared.stats.mbox.on_error();
                Err(word)
            }
        }
    }

    /// Gives a slot back to `space` after a message left the queue.
    fn release_slot(&self, block: &MboxBlock<K>) {
        if let Err(err) = self.shared.kernel.sem_post(&block.space, self.post_opt()) {
            error!("mbox_fetch: space semaphore post failed: {err}");
        }
    }

    pub(crate) fn post_word(&self, id: SlotId, word: usize) -> Result<(), usize> {
        let Ok(block) = self.mbox_block(id) else {
            error!("mbox_post: stale mailbox handle");
            return Err(word);
        };
        let kernel = &self.shared.kernel;
        if self.context.in_isr() {
            if !kernel.sem_accept(&block.space) {
                warn!("mbox_post: mailbox full in interrupt context, message dropped");
                self.shared.stats.mbox.on_error();
                return Err(word);
            }
        } else if let Err(err) = kernel.sem_pend(&block.space, 0) {
            error!("mbox_post: waiting for space failed: {err}");
            self.shared.stats.mbox.on_error();
            return Err(word);
        }
        self.enqueue(block, word)
    }

    pub(crate) fn trypost_word(&self, id: SlotId, word: usize) -> Result<(), (SysError, usize)> {
        let block = match self.mbox_block(id) {
            Ok(block) => block,
            Err(err) => return Err((err, word)),
        };
        if !self.shared.kernel.sem_accept(&block.space) {
            debug!("mbox_trypost: mailbox full");
            return Err((SysError::Full, word));
        }
        self.enqueue(block, word).map_err(|word| (SysError::Full, word))
    }

    pub(crate) fn fetch_word(&self, id: SlotId, timeout_ms: u32) -> SysResult<(usize, u32)> {
        self.refuse_in_isr("mbox_fetch")?;
        let block = self.mbox_block(id)?;
        let kernel = &self.shared.kernel;

        let watch = Stopwatch::start(kernel);
        let word = kernel.q_pend(&block.queue, self.timeout_ticks(timeout_ms))?;
        self.release_slot(block);
        Ok((word, watch.elapsed_ms(kernel)))
    }

    pub(crate) fn tryfetch_word(&self, id: SlotId) -> SysResult<usize> {
        let block = self.mbox_block(id)?;
        let word = self
            .shared
            .kernel
            .q_accept(&block.queue)
            .map_err(|_| SysError::Empty)?;
        self.release_slot(block);
        Ok(word)
    }

    pub(crate) fn mailbox_len(&self, id: SlotId) -> usize {
        self.mbox_block(id)
            .map_or(0, |block| self.shared.kernel.q_entries(&block.queue))
    }

    pub(crate) fn free_mailbox(&self, id: SlotId) -> Result<(), usize> {
        let pending = self.mailbox_len(id);
        if pending > 0 {
            error!("mbox_free: mailbox still holds {pending} message(s)");
            self.shared.stats.mbox.on_error();
            return Err(pending);
        }
        let Ok(block) = self.mbox_block(id) else {
            return Ok(());
        };
        let kernel = &self.shared.kernel;
        if let Err(err) = kernel.q_del(&block.queue) {
            error!("mbox_free: queue delete failed: {err}");
        }
        if let Err(err) = kernel.sem_del(&block.space) {
            error!("mbox_free: space semaphore delete failed: {err}");
        }
        self.shared.mboxes.release(id);
        self.shared.stats.mbox.on_free();
        debug!("mbox_free: slot {} released", id.index());
        Ok(())
    }
}
