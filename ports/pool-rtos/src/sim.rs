//! Host simulator of a pool-only RTOS kernel.
//!
//! Control blocks are initialised in place like their kernel counterparts,
//! tasks are std threads and the tick counter follows the host monotonic
//! clock. Posts made with [`PostOpt::NO_SCHED`] are counted so tests can
//! check that interrupt-context posts defer scheduling.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use sysarch::host::{BoundedQueue, HostSemaphore, Wait};
use sysarch::time::{MonotonicTicks, Tick, TickSource};
use sysarch::{thread_name, ThreadEntry, ThreadName};

use crate::kernel::{OsError, PoolKernel, PostOpt, StackRegion};

#[derive(Debug, Default)]
pub struct SimQueue {
    queue: BoundedQueue,
    created: AtomicBool,
}

#[derive(Debug, Default)]
pub struct SimSem {
    sem: HostSemaphore,
    created: AtomicBool,
}

#[derive(Debug, Default)]
pub struct SimMutex {
    sem: HostSemaphore,
    holder: Mutex<Option<ThreadId>>,
    created: AtomicBool,
}

/// Simulated task control block.
#[derive(Debug, Default)]
pub struct SimTcb {
    name: Mutex<ThreadName>,
    prio: AtomicU8,
    stack_len: AtomicUsize,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimTcb {
    pub fn name(&self) -> ThreadName {
        self.name.lock().clone()
    }

    /// Native priority the task was created with.
    pub fn prio(&self) -> u8 {
        self.prio.load(Ordering::Acquire)
    }

    /// Stack words handed to the task.
    pub fn stack_len(&self) -> usize {
        self.stack_len.load(Ordering::Acquire)
    }

    /// Waits for the task's thread to finish; `false` if it was never
    /// started or was already joined.
    pub fn join(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct SimPoolKernel {
    clock: MonotonicTicks,
    prio_max: u8,
    no_sched_posts: AtomicUsize,
    task_dels: AtomicUsize,
    fail_task_create: AtomicBool,
}

impl SimPoolKernel {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            clock: MonotonicTicks::new(rate_hz),
            prio_max: 64,
            no_sched_posts: AtomicUsize::new(0),
            task_dels: AtomicUsize::new(0),
            fail_task_create: AtomicBool::new(false),
        }
    }

    /// Starts the tick counter at `tick` instead of zero.
    pub fn with_tick_offset(mut self, tick: Tick) -> Self {
        self.clock = MonotonicTicks::with_offset(tick, self.clock.rate_hz());
        self
    }

    pub fn with_prio_max(mut self, levels: u8) -> Self {
        self.prio_max = levels;
        self
    }

    /// Posts made with scheduling deferred.
    pub fn no_sched_posts(&self) -> usize {
        self.no_sched_posts.load(Ordering::Acquire)
    }

    /// Tasks removed through `task_del`.
    pub fn task_dels(&self) -> usize {
        self.task_dels.load(Ordering::Acquire)
    }

    /// Makes the next `task_create` fail.
    pub fn fail_next_task_create(&self) {
        self.fail_task_create.store(true, Ordering::Release);
    }

    fn wait_for(&self, ticks: u32) -> Wait {
        match ticks {
            0 => Wait::Forever,
            ticks => Wait::For(self.clock.ticks_to_duration(ticks)),
        }
    }

    fn note_post(&self, opt: PostOpt) {
        if opt.no_sched {
            self.no_sched_posts.fetch_add(1, Ordering::AcqRel);
        }
    }
}

fn ensure_created(created: &AtomicBool) -> Result<(), OsError> {
    if created.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(OsError::ObjNotCreated)
    }
}

impl TickSource for SimPoolKernel {
    fn now(&self) -> Tick {
        self.clock.now()
    }

    fn rate_hz(&self) -> u32 {
        self.clock.rate_hz()
    }
}

impl PoolKernel for SimPoolKernel {
    type Queue = SimQueue;
    type Semaphore = SimSem;
    type Mutex = SimMutex;
    type Task = SimTcb;
    type StackWord = u32;

    fn prio_max(&self) -> u8 {
        self.prio_max
    }

    fn q_create(&self, q: &SimQueue, _name: &str, capacity: usize) -> Result<(), OsError> {
        q.queue.reset(capacity);
        q.created.store(true, Ordering::Release);
        Ok(())
    }

    fn q_post(&self, q: &SimQueue, msg: usize, opt: PostOpt) -> Result<(), OsError> {
        ensure_created(&q.created)?;
        if !q.queue.push(msg, Wait::No) {
            return Err(OsError::QueueFull);
        }
        self.note_post(opt);
        Ok(())
    }

    fn q_pend(&self, q: &SimQueue, timeout_ticks: u32) -> Result<usize, OsError> {
        ensure_created(&q.created)?;
        q.queue.pop(self.wait_for(timeout_ticks)).ok_or(OsError::Timeout)
    }

    fn q_accept(&self, q: &SimQueue) -> Result<usize, OsError> {
        ensure_created(&q.created)?;
        q.queue.pop(Wait::No).ok_or(OsError::QueueEmpty)
    }

    fn q_entries(&self, q: &SimQueue) -> usize {
        q.queue.len()
    }

    fn q_del(&self, q: &SimQueue) -> Result<(), OsError> {
        ensure_created(&q.created)?;
        q.created.store(false, Ordering::Release);
        q.queue.reset(0);
        Ok(())
    }

    fn sem_create(&self, sem: &SimSem, _name: &str, count: u32, max: u32) -> Result<(), OsError> {
        sem.sem.reset(count, max);
        sem.created.store(true, Ordering::Release);
        Ok(())
    }

    fn sem_pend(&self, sem: &SimSem, timeout_ticks: u32) -> Result<(), OsError> {
        ensure_created(&sem.created)?;
        if sem.sem.acquire(self.wait_for(timeout_ticks)) {
            Ok(())
        } else {
            Err(OsError::Timeout)
        }
    }

    fn sem_accept(&self, sem: &SimSem) -> bool {
        sem.created.load(Ordering::Acquire) && sem.sem.try_wait()
    }

    fn sem_post(&self, sem: &SimSem, opt: PostOpt) -> Result<(), OsError> {
        ensure_created(&sem.created)?;
        if !sem.sem.post() {
            return Err(OsError::SemOverflow);
        }
        self.note_post(opt);
        Ok(())
    }

    fn sem_del(&self, sem: &SimSem) -> Result<(), OsError> {
        ensure_created(&sem.created)?;
        sem.created.store(false, Ordering::Release);
        Ok(())
    }

    fn mutex_create(&self, mutex: &SimMutex, _name: &str) -> Result<(), OsError> {
        mutex.sem.reset(1, 1);
        *mutex.holder.lock() = None;
        mutex.created.store(true, Ordering::Release);
        Ok(())
    }

    fn mutex_pend(&self, mutex: &SimMutex, timeout_ticks: u32) -> Result<(), OsError> {
        ensure_created(&mutex.created)?;
        if !mutex.sem.acquire(self.wait_for(timeout_ticks)) {
            return Err(OsError::Timeout);
        }
        *mutex.holder.lock() = Some(thread::current().id());
        Ok(())
    }

    fn mutex_post(&self, mutex: &SimMutex) -> Result<(), OsError> {
        ensure_created(&mutex.created)?;
        let mut holder = mutex.holder.lock();
        if *holder != Some(thread::current().id()) {
            return Err(OsError::NotOwner);
        }
        *holder = None;
        drop(holder);
        mutex.sem.post();
        Ok(())
    }

    fn mutex_del(&self, mutex: &SimMutex) -> Result<(), OsError> {
        ensure_created(&mutex.created)?;
        mutex.created.store(false, Ordering::Release);
        Ok(())
    }

    fn task_create(
        &self,
        tcb: &SimTcb,
        name: &str,
        entry: ThreadEntry,
        prio: u8,
        stack: StackRegion<u32>,
    ) -> Result<(), OsError> {
        if self.fail_task_create.swap(false, Ordering::AcqRel) {
            return Err(OsError::TaskCreate);
        }
        *tcb.name.lock() = thread_name(name);
        tcb.prio.store(prio, Ordering::Release);
        tcb.stack_len.store(stack.len(), Ordering::Release);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(entry)
            .map_err(|_| OsError::TaskCreate)?;
        *tcb.handle.lock() = Some(handle);
        Ok(())
    }

    /// Forgets the task. A host thread cannot be stopped, so its thread
    /// keeps running detached; only parked or finished tasks are deleted.
    fn task_del(&self, tcb: &SimTcb) -> Result<(), OsError> {
        match tcb.handle.lock().take() {
            Some(_detached) => {
                self.task_dels.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            None => Err(OsError::ObjNotCreated),
        }
    }
}
