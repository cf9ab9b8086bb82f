//! Mailboxes built from a ring buffer and two counting semaphores.
//!
//! `mail` counts queued messages and `space` counts free slots, so a
//! blocking post waits on `space` and a fetch waits on `mail`. The ring
//! itself is only touched under its lock.

use std::marker::PhantomData;
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use sysarch::host::HostSemaphore;
use sysarch::pool::SlotId;
use sysarch::time::{Stopwatch, TickSource, WAIT_FOREVER};
use sysarch::{ExecContext, ResourceKind, SysError, SysResult};

use crate::{PosixSys, SEMS_PER_MAILBOX};

/// Fixed-capacity FIFO of message words.
#[derive(Debug, Default)]
pub(crate) struct Ring {
    words: Vec<usize>,
    head: usize,
    len: usize,
}

impl Ring {
    pub(crate) fn reset(&mut self, capacity: usize) {
        self.words.clear();
        self.words.resize(capacity, 0);
        self.head = 0;
        self.len = 0;
    }

    pub(crate) fn capacity(&self) -> usize {
        self.words.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push(&mut self, word: usize) -> bool {
        if self.len == self.capacity() {
            return false;
        }
        let tail = (self.head + self.len) % self.capacity();
        self.words[tail] = word;
        self.len += 1;
        true
    }

    pub(crate) fn pop(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let word = self.words[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(word)
    }
}

/// One entry of the mailbox table.
#[derive(Debug, Default)]
pub(crate) struct MboxSlot {
    ring: Mutex<Ring>,
    mail: HostSemaphore,
    space: HostSemaphore,
}

/// Handle to a mailbox of `M` messages.
#[must_use = "a mailbox must be released with `mbox_free`"]
pub struct PosixMailbox<M> {
    slot: SlotId,
    _mail: PhantomData<fn(M) -> M>,
}

impl<M> PosixMailbox<M> {
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

impl<M> std::fmt::Debug for PosixMailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosixMailbox").field("slot", &self.slot).finish()
    }
}

impl<C: ExecContext, T: TickSource> PosixSys<C, T> {
    fn mbox_slot(&self, id: SlotId) -> SysResult<&MboxSlot> {
        self.mailboxes.get(id).ok_or(SysError::InvalidHandle)
    }

    fn mailbox_exhausted(&self, reason: &str) -> SysError {
        warn!("mbox_new: {reason}");
        self.stats.mbox.on_error();
        SysError::OutOfResources(ResourceKind::Mailbox)
    }

    pub(crate) fn create_mailbox(&self, capacity: usize) -> SysResult<SlotId> {
        if capacity == 0 || capacity > self.config.mbox_size {
            return Err(self.mailbox_exhausted("capacity outside the supported range"));
        }
        if !self.sem_budget.reserve(SEMS_PER_MAILBOX) {
            return Err(self.mailbox_exhausted("semaphore budget exhausted"));
        }
        let Some(id) = self.mailboxes.acquire() else {
            self.sem_budget.release(SEMS_PER_MAILBOX);
            return Err(self.mailbox_exhausted("mailbox table full"));
        };

        let slot = self.mbox_slot(id)?;
        slot.ring.lock().reset(capacity);
        slot.mail.reset(0, capacity as u32);
        slot.space.reset(capacity as u32, capacity as u32);

        self.stats.mbox.on_create();
        debug!("mbox_new: slot {} holds {} messages", id.index(), capacity);
        Ok(id)
    }

    fn enqueue(&self, slot: &MboxSlot, word: usize) {
        let pushed = slot.ring.lock().push(word);
        debug_assert!(pushed, "space semaphore out of step with ring");
        let receiver_waiting = slot.mail.waiters() > 0;
        slot.mail.post();
        if receiver_waiting && self.context.in_isr() {
            self.context.request_yield();
        }
    }

    fn dequeue(&self, slot: &MboxSlot) -> SysResult<usize> {
        let word = slot.ring.lock().pop().ok_or(SysError::Empty)?;
        slot.space.post();
        Ok(word)
    }

    /// Blocking post. Hands the word back when it could not be queued.
    pub(crate) fn post_word(&self, id: SlotId, word: usize) -> Result<(), usize> {
        let Ok(slot) = self.mbox_slot(id) else {
            error!("mbox_post: stale mailbox handle");
            return Err(word);
        };
        if self.context.in_isr() {
            if !slot.space.try_wait() {
                warn!("mbox_post: mailbox full in interrupt context, message dropped");
                self.stats.mbox.on_error();
                return Err(word);
            }
        } else {
            slot.space.wait();
        }
        self.enqueue(slot, word);
        Ok(())
    }

    pub(crate) fn trypost_word(&self, id: SlotId, word: usize) -> Result<(), (SysError, usize)> {
        let slot = match self.mbox_slot(id) {
            Ok(slot) => slot,
            Err(err) => return Err((err, word)),
        };
        if !slot.space.try_wait() {
            debug!("mbox_trypost: mailbox full");
            return Err((SysError::Full, word));
        }
        self.enqueue(slot, word);
        Ok(())
    }

    pub(crate) fn fetch_word(&self, id: SlotId, timeout_ms: u32) -> SysResult<(usize, u32)> {
        self.refuse_in_isr("mbox_fetch")?;
        let slot = self.mbox_slot(id)?;

        let watch = Stopwatch::start(&self.clock);
        let got_mail = if timeout_ms == WAIT_FOREVER {
            slot.mail.wait();
            true
        } else {
            slot.mail.wait_for(Duration::from_millis(u64::from(timeout_ms)))
        };
        if !got_mail {
            return Err(SysError::Timeout);
        }

        let word = self.dequeue(slot)?;
        Ok((word, watch.elapsed_ms(&self.clock)))
    }

    pub(crate) fn tryfetch_word(&self, id: SlotId) -> SysResult<usize> {
        let slot = self.mbox_slot(id)?;
        if !slot.mail.try_wait() {
            return Err(SysError::Empty);
        }
        self.dequeue(slot)
    }

    pub(crate) fn mailbox_len(&self, id: SlotId) -> usize {
        self.mbox_slot(id).map_or(0, |slot| slot.ring.lock().len())
    }

    /// Releases an empty mailbox. Returns the pending count otherwise.
    pub(crate) fn free_mailbox(&self, id: SlotId) -> Result<(), usize> {
        let pending = self.mailbox_len(id);
        if pending > 0 {
            error!("mbox_free: mailbox still holds {pending} message(s)");
            self.stats.mbox.on_error();
            return Err(pending);
        }
        if self.mailboxes.release(id) {
            self.sem_budget.release(SEMS_PER_MAILBOX);
            self.stats.mbox.on_free();
            debug!("mbox_free: slot {} released", id.index());
        }
        Ok(())
    }
}
