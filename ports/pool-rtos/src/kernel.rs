//! Kernel binding for pool-only RTOS kernels.
//!
//! The kernel never allocates. Every call that creates an object receives a
//! control block owned by the caller and initialises it in place, the way
//! `OSQCreate(&q, ...)` works on uC/OS-III. Tasks run on a caller-owned
//! stack region. Pend calls take a tick timeout where 0 means "forever".

use core::fmt;
use core::ptr::NonNull;

use sysarch::time::TickSource;
use sysarch::{ResourceKind, SysError, ThreadEntry, UsageError};

/// Status codes returned by kernel calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsError {
    Timeout,
    QueueFull,
    QueueEmpty,
    /// Semaphore count at its maximum.
    SemOverflow,
    /// Mutex posted by a task that does not own it.
    NotOwner,
    /// Control block was never created or already deleted.
    ObjNotCreated,
    /// Pend called from an interrupt handler.
    PendIsr,
    TaskCreate,
    /// Any other kernel status code.
    Other(u16),
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "pend timed out"),
            Self::QueueFull => write!(f, "queue full"),
            Self::QueueEmpty => write!(f, "queue empty"),
            Self::SemOverflow => write!(f, "semaphore overflow"),
            Self::NotOwner => write!(f, "mutex not owned by caller"),
            Self::ObjNotCreated => write!(f, "object not created"),
            Self::PendIsr => write!(f, "pend from interrupt"),
            Self::TaskCreate => write!(f, "task creation failed"),
            Self::Other(code) => write!(f, "kernel error {code}"),
        }
    }
}

impl From<OsError> for SysError {
    fn from(err: OsError) -> Self {
        match err {
            OsError::Timeout => SysError::Timeout,
            OsError::QueueFull | OsError::SemOverflow => SysError::Full,
            OsError::QueueEmpty => SysError::Empty,
            OsError::NotOwner => SysError::Usage(UsageError::NotOwner),
            OsError::PendIsr => SysError::Usage(UsageError::BlockingInIsr),
            OsError::TaskCreate => SysError::OutOfResources(ResourceKind::Thread),
            OsError::ObjNotCreated | OsError::Other(_) => SysError::InvalidHandle,
        }
    }
}

/// Options for post calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostOpt {
    /// Do not run the scheduler after posting (`OS_OPT_POST_NO_SCHED`).
    pub no_sched: bool,
}

impl PostOpt {
    pub const DEFAULT: Self = Self { no_sched: false };
    pub const NO_SCHED: Self = Self { no_sched: true };
}

/// Stack memory handed to a task.
#[derive(Debug)]
pub struct StackRegion<W> {
    base: NonNull<W>,
    len: usize,
}

// SAFETY: a region is handed to exactly one task and outlives it.
unsafe impl<W: Send> Send for StackRegion<W> {}
unsafe impl<W: Sync> Sync for StackRegion<W> {}

impl<W> StackRegion<W> {
    /// # Safety
    ///
    /// `base` must point to `len` words that stay valid and unused by anyone
    /// else until the task using them is deleted or has returned.
    pub unsafe fn new(base: NonNull<W>, len: usize) -> Self {
        Self { base, len }
    }

    pub fn base(&self) -> NonNull<W> {
        self.base
    }

    /// Size in stack words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Scheduler services consumed by [`PoolSys`](crate::PoolSys).
///
/// The tick counter comes from the [`TickSource`] supertrait.
pub trait PoolKernel: TickSource {
    type Queue: Default + Send + Sync;
    type Semaphore: Default + Send + Sync;
    type Mutex: Default + Send + Sync;
    type Task: Default + Send + Sync;
    type StackWord: Copy + Default + Send + Sync + 'static;

    /// Number of priority levels; 0 is the most urgent.
    fn prio_max(&self) -> u8;

    fn q_create(&self, queue: &Self::Queue, name: &str, capacity: usize) -> Result<(), OsError>;
    fn q_post(&self, queue: &Self::Queue, msg: usize, opt: PostOpt) -> Result<(), OsError>;
    fn q_pend(&self, queue: &Self::Queue, timeout_ticks: u32) -> Result<usize, OsError>;
    /// Non-blocking pend, usable from interrupts.
    fn q_accept(&self, queue: &Self::Queue) -> Result<usize, OsError>;
    fn q_entries(&self, queue: &Self::Queue) -> usize;
    fn q_del(&self, queue: &Self::Queue) -> Result<(), OsError>;

    fn sem_create(&self, sem: &Self::Semaphore, name: &str, count: u32, max: u32) -> Result<(), OsError>;
    fn sem_pend(&self, sem: &Self::Semaphore, timeout_ticks: u32) -> Result<(), OsError>;
    /// Non-blocking pend, usable from interrupts.
    fn sem_accept(&self, sem: &Self::Semaphore) -> bool;
    fn sem_post(&self, sem: &Self::Semaphore, opt: PostOpt) -> Result<(), OsError>;
    fn sem_del(&self, sem: &Self::Semaphore) -> Result<(), OsError>;

    fn mutex_create(&self, mutex: &Self::Mutex, name: &str) -> Result<(), OsError>;
    fn mutex_pend(&self, mutex: &Self::Mutex, timeout_ticks: u32) -> Result<(), OsError>;
    fn mutex_post(&self, mutex: &Self::Mutex) -> Result<(), OsError>;
    fn mutex_del(&self, mutex: &Self::Mutex) -> Result<(), OsError>;

    /// Creates and starts a task on `stack`, at native priority `prio`.
    fn task_create(
        &self,
        tcb: &Self::Task,
        name: &str,
        entry: ThreadEntry,
        prio: u8,
        stack: StackRegion<Self::StackWord>,
    ) -> Result<(), OsError>;

    fn task_del(&self, tcb: &Self::Task) -> Result<(), OsError>;
}
