//! Fixed-capacity slot pools.
//!
//! A [`SlotPool`] allocates every slot once, at construction, and afterwards
//! only hands slots out and takes them back. Acquisition never blocks and
//! never allocates: an exhausted pool returns `None`. Handles carry a
//! generation so an id kept past its release no longer resolves.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use log::{debug, trace};

const NIL: u16 = u16::MAX;

/// Largest capacity a pool accepts.
pub const MAX_SLOTS: usize = NIL as usize;

/// Handle to an acquired slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId {
    index: u16,
    generation: u32,
}

impl SlotId {
    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Occupancy counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    /// Total number of slots
    pub total: usize,
    /// Slots currently available
    pub free: usize,
    /// Slots currently handed out
    pub used: usize,
    /// Lowest `free` value ever observed
    pub min_free: usize,
}

impl PoolStats {
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            free: total,
            used: 0,
            min_free: total,
        }
    }

    fn on_acquire(&mut self) {
        self.used += 1;
        self.free -= 1;
        if self.free < self.min_free {
            self.min_free = self.free;
        }
    }

    fn on_release(&mut self) {
        if self.used > 0 {
            self.used -= 1;
            self.free += 1;
        }
    }

    pub const fn is_exhausted(&self) -> bool {
        self.free == 0
    }

    /// Utilization in percent.
    pub fn utilization(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.used * 100) / self.total) as u8
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total,
            self.free,
            self.used,
            self.min_free
        );
    }
}

struct Ledger {
    head: u16,
    next: Box<[u16]>,
    live: Box<[bool]>,
    generation: Box<[u32]>,
    stats: PoolStats,
}

impl Ledger {
    fn new(capacity: usize) -> Self {
        let next = (0..capacity)
            .map(|i| if i + 1 < capacity { (i + 1) as u16 } else { NIL })
            .collect();
        Self {
            head: if capacity == 0 { NIL } else { 0 },
            next,
            live: alloc::vec![false; capacity].into_boxed_slice(),
            generation: alloc::vec![0; capacity].into_boxed_slice(),
            stats: PoolStats::new(capacity),
        }
    }

    fn resolves(&self, id: SlotId) -> bool {
        let index = id.index();
        index < self.live.len() && self.live[index] && self.generation[index] == id.generation
    }
}

/// Pool of `T` slots created once and recycled through a free list.
pub struct SlotPool<T> {
    name: &'static str,
    slots: Box<[T]>,
    ledger: Mutex<RefCell<Ledger>>,
}

impl<T> SlotPool<T> {
    /// Builds a pool of `capacity` slots, each initialised by `init`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_SLOTS`].
    pub fn new(name: &'static str, capacity: usize, mut init: impl FnMut() -> T) -> Self {
        assert!(capacity <= MAX_SLOTS, "pool `{name}` too large");
        let slots: Vec<T> = (0..capacity).map(|_| init()).collect();
        Self {
            name,
            slots: slots.into_boxed_slice(),
            ledger: Mutex::new(RefCell::new(Ledger::new(capacity))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Takes a free slot, or `None` when the pool is exhausted.
    pub fn acquire(&self) -> Option<SlotId> {
        let id = critical_section::with(|cs| {
            let mut ledger = self.ledger.borrow_ref_mut(cs);
            let index = ledger.head;
            if index == NIL {
                return None;
            }
            let slot = index as usize;
            ledger.head = ledger.next[slot];
            ledger.next[slot] = NIL;
            ledger.live[slot] = true;
            ledger.stats.on_acquire();
            Some(SlotId {
                index,
                generation: ledger.generation[slot],
            })
        });
        if id.is_none() {
            trace!("pool `{}`: exhausted", self.name);
        }
        id
    }

    /// Returns a slot to the free list.
    ///
    /// Returns `false` for a stale id or a double release; the pool is left
    /// untouched in that case.
    pub fn release(&self, id: SlotId) -> bool {
        let released = critical_section::with(|cs| {
            let mut ledger = self.ledger.borrow_ref_mut(cs);
            if !ledger.resolves(id) {
                return false;
            }
            let slot = id.index();
            ledger.live[slot] = false;
            ledger.generation[slot] = ledger.generation[slot].wrapping_add(1);
            ledger.next[slot] = ledger.head;
            ledger.head = id.index;
            ledger.stats.on_release();
            true
        });
        if !released {
            debug!("pool `{}`: release of stale slot {:?}", self.name, id);
        }
        released
    }

    pub fn is_live(&self, id: SlotId) -> bool {
        critical_section::with(|cs| self.ledger.borrow_ref(cs).resolves(id))
    }

    /// The slot behind a live id.
    pub fn get(&self, id: SlotId) -> Option<&T> {
        if self.is_live(id) {
            self.slots.get(id.index())
        } else {
            None
        }
    }

    /// Ids of every slot currently handed out.
    pub fn live_ids(&self) -> Vec<SlotId> {
        critical_section::with(|cs| {
            let ledger = self.ledger.borrow_ref(cs);
            ledger
                .live
                .iter()
                .enumerate()
                .filter(|(_, live)| **live)
                .map(|(index, _)| SlotId {
                    index: index as u16,
                    generation: ledger.generation[index],
                })
                .collect()
        })
    }

    pub fn stats(&self) -> PoolStats {
        critical_section::with(|cs| self.ledger.borrow_ref(cs).stats)
    }
}

impl<T> fmt::Debug for SlotPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}
