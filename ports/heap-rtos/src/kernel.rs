//! Kernel binding for heap-allocating RTOS kernels.
//!
//! The calls mirror a FreeRTOS-style API: objects are created on the kernel
//! heap and returned as handles, blocking calls take a tick count with
//! [`MAX_DELAY`] meaning "forever", and every call usable from an interrupt
//! has a `_from_isr` variant that reports whether a higher-priority task
//! was woken.

use sysarch::time::TickSource;
use sysarch::ThreadEntry;

/// Tick count that blocks without limit (`portMAX_DELAY`).
pub const MAX_DELAY: u32 = u32::MAX;

/// Scheduler services consumed by [`HeapSys`](crate::HeapSys).
///
/// The tick counter comes from the [`TickSource`] supertrait.
pub trait HeapKernel: TickSource {
    type Queue: Send + Sync;
    type Semaphore: Send + Sync;
    type Mutex: Send + Sync;
    type Task: Send;

    /// Longest queue `queue_create` accepts.
    fn queue_length_max(&self) -> usize;
    /// Creates a queue of `length` word-sized items.
    fn queue_create(&self, length: usize) -> Option<Self::Queue>;
    fn queue_delete(&self, queue: Self::Queue);
    /// Appends to the back, blocking up to `ticks`.
    fn queue_send(&self, queue: &Self::Queue, item: usize, ticks: u32) -> bool;
    fn queue_send_from_isr(&self, queue: &Self::Queue, item: usize, woken: &mut bool) -> bool;
    fn queue_receive(&self, queue: &Self::Queue, ticks: u32) -> Option<usize>;
    fn queue_receive_from_isr(&self, queue: &Self::Queue, woken: &mut bool) -> Option<usize>;
    fn queue_messages_waiting(&self, queue: &Self::Queue) -> usize;

    fn semaphore_create(&self, max: u32, initial: u32) -> Option<Self::Semaphore>;
    fn semaphore_delete(&self, sem: Self::Semaphore);
    fn semaphore_take(&self, sem: &Self::Semaphore, ticks: u32) -> bool;
    /// Fails when the count is already at its maximum.
    fn semaphore_give(&self, sem: &Self::Semaphore) -> bool;
    fn semaphore_give_from_isr(&self, sem: &Self::Semaphore, woken: &mut bool) -> bool;

    fn mutex_create(&self) -> Option<Self::Mutex>;
    fn mutex_delete(&self, mutex: Self::Mutex);
    fn mutex_take(&self, mutex: &Self::Mutex, ticks: u32) -> bool;
    /// Fails when the caller is not the holder.
    fn mutex_give(&self, mutex: &Self::Mutex) -> bool;

    /// Creates and starts a task. `stack_depth` is in stack words.
    fn task_create(
        &self,
        name: &str,
        entry: ThreadEntry,
        stack_depth: usize,
        priority: u32,
    ) -> Option<Self::Task>;

    /// Number of priority levels; valid priorities are `0..max_priorities()`.
    fn max_priorities(&self) -> u32;

    /// Requests a context switch on interrupt exit (`portYIELD_FROM_ISR`).
    fn yield_from_isr(&self);
}
