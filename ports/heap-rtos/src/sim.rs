//! Host simulator of a heap-allocating RTOS kernel.
//!
//! Queues, semaphores and mutexes are host blocking primitives, tasks are
//! std threads, and the tick counter follows the host monotonic clock. An
//! optional object budget makes the kernel heap run out on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use sysarch::host::{BoundedQueue, HostSemaphore, Wait};
use sysarch::time::{MonotonicTicks, Tick, TickSource};
use sysarch::{thread_name, ThreadEntry, ThreadName};

use crate::kernel::{HeapKernel, MAX_DELAY};

/// Longest queue the simulated heap hands out by default.
pub const DEFAULT_QUEUE_LENGTH_MAX: usize = 1024;

/// Mutex with holder tracking, like a kernel mutex.
#[derive(Debug)]
pub struct SimMutex {
    sem: HostSemaphore,
    holder: Mutex<Option<ThreadId>>,
}

/// A simulated task.
#[derive(Debug)]
pub struct SimTask {
    name: ThreadName,
    priority: u32,
    handle: JoinHandle<()>,
}

impl SimTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

#[derive(Debug)]
pub struct SimHeapKernel {
    clock: MonotonicTicks,
    max_priorities: u32,
    queue_length_max: usize,
    object_budget: Option<usize>,
    live_objects: Arc<AtomicUsize>,
    isr_yields: AtomicUsize,
}

impl SimHeapKernel {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            clock: MonotonicTicks::new(rate_hz),
            max_priorities: 8,
            queue_length_max: DEFAULT_QUEUE_LENGTH_MAX,
            object_budget: None,
            live_objects: Arc::new(AtomicUsize::new(0)),
            isr_yields: AtomicUsize::new(0),
        }
    }

    /// Limits the number of live kernel objects, tasks included.
    pub fn with_object_budget(mut self, objects: usize) -> Self {
        self.object_budget = Some(objects);
        self
    }

    /// Starts the tick counter at `tick` instead of zero.
    pub fn with_tick_offset(mut self, tick: Tick) -> Self {
        self.clock = MonotonicTicks::with_offset(tick, self.clock.rate_hz());
        self
    }

    pub fn with_queue_length_max(mut self, length: usize) -> Self {
        self.queue_length_max = length;
        self
    }

    pub fn with_max_priorities(mut self, levels: u32) -> Self {
        self.max_priorities = levels;
        self
    }

    /// Times `yield_from_isr` was called.
    pub fn isr_yields(&self) -> usize {
        self.isr_yields.load(Ordering::Acquire)
    }

    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::Acquire)
    }

    fn allocate(&self) -> bool {
        let budget = self.object_budget.unwrap_or(usize::MAX);
        self.live_objects
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < budget).then_some(live + 1)
            })
            .is_ok()
    }

    fn free(&self) {
        self.live_objects.fetch_sub(1, Ordering::AcqRel);
    }

    fn wait_for(&self, ticks: u32) -> Wait {
        match ticks {
            0 => Wait::No,
            MAX_DELAY => Wait::Forever,
            ticks => Wait::For(self.clock.ticks_to_duration(ticks)),
        }
    }
}

impl TickSource for SimHeapKernel {
    fn now(&self) -> Tick {
        self.clock.now()
    }

    fn rate_hz(&self) -> u32 {
        self.clock.rate_hz()
    }
}

impl HeapKernel for SimHeapKernel {
    type Queue = BoundedQueue;
    type Semaphore = HostSemaphore;
    type Mutex = SimMutex;
    type Task = SimTask;

    fn queue_length_max(&self) -> usize {
        self.queue_length_max
    }

    fn queue_create(&self, length: usize) -> Option<BoundedQueue> {
        if length > self.queue_length_max {
            return None;
        }
        self.allocate().then(|| BoundedQueue::new(length))
    }

    fn queue_delete(&self, queue: BoundedQueue) {
        drop(queue);
        self.free();
    }

    fn queue_send(&self, queue: &BoundedQueue, item: usize, ticks: u32) -> bool {
        queue.push(item, self.wait_for(ticks))
    }

    fn queue_send_from_isr(&self, queue: &BoundedQueue, item: usize, woken: &mut bool) -> bool {
        let receiver = queue.has_waiting_receivers();
        let sent = queue.push(item, Wait::No);
        *woken = sent && receiver;
        sent
    }

    fn queue_receive(&self, queue: &BoundedQueue, ticks: u32) -> Option<usize> {
        queue.pop(self.wait_for(ticks))
    }

    fn queue_receive_from_isr(&self, queue: &BoundedQueue, woken: &mut bool) -> Option<usize> {
        *woken = false;
        queue.pop(Wait::No)
    }

    fn queue_messages_waiting(&self, queue: &BoundedQueue) -> usize {
        queue.len()
    }

    fn semaphore_create(&self, max: u32, initial: u32) -> Option<HostSemaphore> {
        self.allocate().then(|| HostSemaphore::bounded(initial, max))
    }

    fn semaphore_delete(&self, sem: HostSemaphore) {
        drop(sem);
        self.free();
    }

    fn semaphore_take(&self, sem: &HostSemaphore, ticks: u32) -> bool {
        sem.acquire(self.wait_for(ticks))
    }

    fn semaphore_give(&self, sem: &HostSemaphore) -> bool {
        sem.post()
    }

    fn semaphore_give_from_isr(&self, sem: &HostSemaphore, woken: &mut bool) -> bool {
        let waiter = sem.waiters() > 0;
        let given = sem.post();
        *woken = given && waiter;
        given
    }

    fn mutex_create(&self) -> Option<SimMutex> {
        self.allocate().then(|| SimMutex {
            sem: HostSemaphore::bounded(1, 1),
            holder: Mutex::new(None),
        })
    }

    fn mutex_delete(&self, mutex: SimMutex) {
        drop(mutex);
        self.free();
    }

    fn mutex_take(&self, mutex: &SimMutex, ticks: u32) -> bool {
        if !mutex.sem.acquire(self.wait_for(ticks)) {
            return false;
        }
        *mutex.holder.lock() = Some(thread::current().id());
        true
    }

    fn mutex_give(&self, mutex: &SimMutex) -> bool {
        let mut holder = mutex.holder.lock();
        if *holder != Some(thread::current().id()) {
            return false;
        }
        *holder = None;
        mutex.sem.post()
    }

    fn task_create(
        &self,
        name: &str,
        entry: ThreadEntry,
        _stack_depth: usize,
        priority: u32,
    ) -> Option<SimTask> {
        if !self.allocate() {
            return None;
        }
        let live = Arc::clone(&self.live_objects);
        let spawned = thread::Builder::new().name(name.to_owned()).spawn(move || {
            entry();
            live.fetch_sub(1, Ordering::AcqRel);
        });
        match spawned {
            Ok(handle) => Some(SimTask {
                name: thread_name(name),
                priority,
                handle,
            }),
            Err(_) => {
                self.free();
                None
            }
        }
    }

    fn max_priorities(&self) -> u32 {
        self.max_priorities
    }

    fn yield_from_isr(&self) {
        self.isr_yields.fetch_add(1, Ordering::AcqRel);
    }
}
