use std::sync::Arc;
use std::time::Duration;

use sysarch::conformance;
use sysarch::{IsrFlag, ResourceKind, SysArch, SysError, ThreadState};

use crate::sim::SimHeapKernel;
use crate::HeapSys;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sys(kernel: SimHeapKernel) -> HeapSys<SimHeapKernel, Arc<IsrFlag>> {
    init_logging();
    HeapSys::with_context(kernel, Arc::new(IsrFlag::new()))
}

#[test]
fn basic_contract() {
    conformance::run_basic(&sys(SimHeapKernel::new(1000)));
}

#[test]
fn threaded_contract() {
    conformance::run_threaded(&Arc::new(sys(SimHeapKernel::new(1000))));
}

#[test]
fn heap_exhaustion_per_kind() {
    conformance::exhaust_mailboxes(&sys(SimHeapKernel::new(1000).with_object_budget(3)), 3);
    conformance::exhaust_semaphores(&sys(SimHeapKernel::new(1000).with_object_budget(2)), 2);
    conformance::exhaust_mutexes(&sys(SimHeapKernel::new(1000).with_object_budget(2)), 2);
}

#[test]
fn interrupt_context_routing() {
    init_logging();
    let flag = Arc::new(IsrFlag::new());
    let sys = HeapSys::with_context(SimHeapKernel::new(1000), Arc::clone(&flag));
    conformance::isr_routing(&sys, &flag);
}

#[test]
fn elapsed_across_counter_wrap() {
    let kernel = SimHeapKernel::new(1000).with_tick_offset(u32::MAX - 5);
    conformance::elapsed_survives_wrap(&Arc::new(sys(kernel)));
}

#[test]
fn slow_tick_rate_still_waits_full_timeout() {
    conformance::fetch_times_out(&sys(SimHeapKernel::new(100)), 50);
}

#[test]
fn partial_tick_timeouts_round_up() {
    let sys = sys(SimHeapKernel::new(100));
    conformance::fetch_times_out(&sys, 15);
    conformance::sem_timeout_keeps_count(&sys, 25);
}

#[test]
fn mailbox_capacity_is_bounded_by_kernel() {
    let sys = sys(SimHeapKernel::new(1000).with_queue_length_max(16));
    assert_eq!(
        sys.mbox_new::<usize>(17).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    assert_eq!(
        sys.mbox_new::<usize>(usize::MAX / 4).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    assert_eq!(sys.stats().mbox.err, 2);
    assert_eq!(sys.kernel().live_objects(), 0);

    let mbox = sys.mbox_new::<usize>(16).unwrap();
    sys.mbox_free(mbox).unwrap();
}

#[test]
fn isr_post_waking_receiver_yields_through_kernel() {
    init_logging();
    let flag = Arc::new(IsrFlag::new());
    let sys = Arc::new(HeapSys::with_context(SimHeapKernel::new(1000), Arc::clone(&flag)));
    let mbox = Arc::new(sys.mbox_new::<u32>(2).unwrap());

    let receiver = {
        let sys = Arc::clone(&sys);
        let mbox = Arc::clone(&mbox);
        std::thread::spawn(move || sys.mbox_fetch(&mbox, 5_000).map(|(msg, _)| msg))
    };
    std::thread::sleep(Duration::from_millis(50));

    let guard = flag.enter();
    sys.mbox_post(&mbox, 7);
    guard.finish();

    assert_eq!(receiver.join().unwrap(), Ok(7));
    assert_eq!(sys.kernel().isr_yields(), 1);
    sys.mbox_free(conformance::reclaim(mbox)).unwrap();
}

#[test]
fn priorities_are_clamped_to_kernel_range() {
    let sys = sys(SimHeapKernel::new(1000).with_max_priorities(5));

    let high = sys.thread_new("high", || {}, 256, 40).unwrap();
    let low = sys.thread_new("low", || {}, 256, -3).unwrap();
    assert_eq!(high.task().priority(), 4);
    assert_eq!(low.task().priority(), 0);
    assert_eq!(high.task().name(), "high");

    high.into_task().join().unwrap();
    low.into_task().join().unwrap();
}

#[test]
fn thread_state_follows_entry() {
    let sys = Arc::new(sys(SimHeapKernel::new(1000)));
    let gate = Arc::new(sys.sem_new(0).unwrap());

    let thread = {
        let sys_ref = Arc::clone(&sys);
        let gate = Arc::clone(&gate);
        sys.thread_new(
            "gated",
            move || {
                let _ = sys_ref.sem_wait(&gate, 5_000);
            },
            256,
            1,
        )
        .unwrap()
    };
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sys.thread_state(&thread), ThreadState::Running);

    sys.sem_signal(&gate);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sys.thread_state(&thread), ThreadState::Terminated);
    assert_eq!(sys.stats().thread.used, 0);
    assert_eq!(sys.thread_delete(thread), Err(SysError::Unsupported));
}

#[test]
fn task_creation_failure_is_reported() {
    let sys = sys(SimHeapKernel::new(1000).with_object_budget(0));
    assert_eq!(
        sys.thread_new("none", || {}, 256, 1).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Thread))
    );
    let stats = sys.stats().thread;
    assert_eq!(stats.used, 0);
    assert_eq!(stats.err, 1);
}

#[test]
fn freed_objects_return_to_kernel_heap() {
    let sys = sys(SimHeapKernel::new(1000));
    let mbox = sys.mbox_new::<usize>(4).unwrap();
    let sem = sys.sem_new(1).unwrap();
    assert_eq!(sys.kernel().live_objects(), 2);
    sys.mbox_free(mbox).unwrap();
    sys.sem_free(sem);
    assert_eq!(sys.kernel().live_objects(), 0);
}

#[test]
fn owned_handles_read_valid() {
    let sys = sys(SimHeapKernel::new(1000));
    let mbox = sys.mbox_new::<usize>(2).unwrap();
    let sem = sys.sem_new(0).unwrap();
    let mutex = sys.mutex_new().unwrap();
    assert!(sys.mbox_valid(&mbox));
    assert!(sys.sem_valid(&sem));
    assert!(sys.mutex_valid(&mutex));
    sys.mbox_free(mbox).unwrap();
    sys.sem_free(sem);
    sys.mutex_free(mutex);
    assert_eq!(sys.kernel().live_objects(), 0);
}
