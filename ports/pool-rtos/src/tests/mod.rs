use std::sync::Arc;
use std::time::Duration;

use sysarch::conformance::{self, WORKER_STACK};
use sysarch::{IsrFlag, ResourceKind, SysArch, SysError, ThreadState, UsageError};

use crate::sim::SimPoolKernel;
use crate::{PoolConfig, PoolSys, PriorityMap};


fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sys(config: PoolConfig) -> PoolSys<SimPoolKernel, Arc<IsrFlag>> {
    init_logging();
    PoolSys::with_context(SimPoolKernel::new(1000), config, Arc::new(IsrFlag::new()))
}

fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached within a second");
}

#[test]
fn basic_contract() {
    conformance::run_basic(&sys(PoolConfig::default()));
}

#[test]
fn threaded_contract() {
    conformance::run_threaded(&Arc::new(sys(PoolConfig::default())));
}

#[test]
fn pool_exhaustion_per_kind() {
    let config = PoolConfig::builder().mbox_count(3).sem_count(2).mutex_count(2).build();
    let sys = sys(config);
    conformance::exhaust_mailboxes(&sys, 3);
    conformance::exhaust_semaphores(&sys, 2);
    conformance::exhaust_mutexes(&sys, 2);

    let usage = sys.pool_usage();
    assert_eq!(usage.mbox.used, 0);
    assert_eq!(usage.mbox.min_free, 0);
    assert_eq!(usage.sem.free, 2);
    assert_eq!(sys.stats().mbox.err, 1);
}

#[test]
fn mailbox_capacity_is_bounded_by_config() {
    let sys = sys(PoolConfig::builder().mbox_capacity_max(8).build());
    let too_big = sys.mbox_new::<usize>(9).map(|_| ());
    assert_eq!(too_big, Err(SysError::OutOfResources(ResourceKind::Mailbox)));
    assert_eq!(
        sys.mbox_new::<usize>(0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    let mbox = sys.mbox_new::<usize>(8).unwrap();
    sys.mbox_free(mbox).unwrap();
    assert_eq!(sys.pool_usage().mbox.used, 0);
}

#[test]
fn interrupt_context_routing() {
    init_logging();
    let flag = Arc::new(IsrFlag::new());
    let sys = PoolSys::with_context(SimPoolKernel::new(1000), PoolConfig::default(), Arc::clone(&flag));
    conformance::isr_routing(&sys, &flag);
}

#[test]
fn isr_posts_defer_scheduling() {
    init_logging();
    let flag = Arc::new(IsrFlag::new());
    let sys = PoolSys::with_context(SimPoolKernel::new(1000), PoolConfig::default(), Arc::clone(&flag));
    let mbox = sys.mbox_new::<u32>(2).unwrap();
    let sem = sys.sem_new(0).unwrap();

    sys.mbox_post(&mbox, 1);
    assert_eq!(sys.kernel().no_sched_posts(), 0);

    let guard = flag.enter();
    sys.mbox_post(&mbox, 2);
    sys.sem_signal(&sem);
    assert!(guard.finish());
    assert_eq!(sys.kernel().no_sched_posts(), 2);

    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(1));
    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(2));
    assert!(sys.sem_wait(&sem, 10).is_ok());
    sys.mbox_free(mbox).unwrap();
    sys.sem_free(sem);
}

#[test]
fn elapsed_across_counter_wrap() {
    init_logging();
    let kernel = SimPoolKernel::new(1000).with_tick_offset(u32::MAX - 5);
    let sys = PoolSys::with_context(kernel, PoolConfig::default(), Arc::new(IsrFlag::new()));
    conformance::elapsed_survives_wrap(&Arc::new(sys));
}

#[test]
fn partial_tick_timeouts_round_up() {
    init_logging();
    let sys = PoolSys::with_context(SimPoolKernel::new(100), PoolConfig::default(), Arc::new(IsrFlag::new()));
    conformance::fetch_times_out(&sys, 15);
    conformance::sem_timeout_keeps_count(&sys, 25);
}

#[test]
fn thread_gets_remapped_priority_and_pool_stack() {
    let sys = sys(PoolConfig::builder().stack_words_max(2048).build());
    let default_prio = sys.thread_new("default", || {}, 0, 0).unwrap();
    let urgent = sys.thread_new("urgent", || {}, 600, 1_000).unwrap();

    let task = sys.task(&default_prio).unwrap();
    assert_eq!(task.prio(), 61);
    assert_eq!(task.stack_len(), 2048);
    assert_eq!(task.name().as_str(), "default");

    let task = sys.task(&urgent).unwrap();
    assert_eq!(task.prio(), 2);
    assert_eq!(task.stack_len(), 600);

    assert!(sys.task(&default_prio).unwrap().join());
    assert!(sys.task(&urgent).unwrap().join());
}

#[test]
fn oversized_stack_is_a_usage_error() {
    let sys = sys(PoolConfig::builder().stack_words_max(256).build());
    assert_eq!(
        sys.thread_new("big", || {}, 257, 0).map(|_| ()),
        Err(SysError::Usage(UsageError::StackTooLarge { requested: 257, max: 256 }))
    );
    assert_eq!(sys.pool_usage().tcb.used, 0);
    assert_eq!(sys.stats().thread.err, 0);
}

#[test]
fn finished_threads_are_swept_when_tcbs_run_out() {
    let sys = sys(PoolConfig::builder().threads(2).build());
    let first = sys.thread_new("one", || {}, WORKER_STACK, 0).unwrap();
    let second = sys.thread_new("two", || {}, WORKER_STACK, 0).unwrap();
    wait_until(|| {
        sys.thread_state(&first) == ThreadState::Terminated
            && sys.thread_state(&second) == ThreadState::Terminated
    });
    assert_eq!(sys.pool_usage().tcb.used, 2);

    let third = sys.thread_new("three", || {}, WORKER_STACK, 0).unwrap();
    assert_eq!(sys.pool_usage().tcb.used, 1);
    assert_eq!(sys.stats().thread.used, 1);
    assert_eq!(sys.stats().thread.max, 2);
    // Swept handles read as finished.
    assert_eq!(sys.thread_state(&first), ThreadState::Terminated);
    wait_until(|| sys.thread_state(&third) == ThreadState::Terminated);
}

#[test]
fn finished_threads_are_swept_when_stacks_run_out() {
    let sys = sys(PoolConfig::builder().tcb_count(2).stack_count(1).build());
    let first = sys.thread_new("one", || {}, WORKER_STACK, 0).unwrap();
    wait_until(|| sys.thread_state(&first) == ThreadState::Terminated);
    assert_eq!(sys.pool_usage().stack.used, 1);

    let second = sys.thread_new("two", || {}, WORKER_STACK, 0).unwrap();
    let usage = sys.pool_usage();
    assert_eq!(usage.stack.used, 1);
    assert_eq!(usage.tcb.used, 1);
    assert_eq!(sys.stats().thread.err, 0);
    wait_until(|| sys.thread_state(&second) == ThreadState::Terminated);
}

#[test]
fn sweep_removes_finished_tasks_from_kernel_first() {
    let sys = sys(PoolConfig::builder().threads(1).build());
    let first = sys.thread_new("one", || {}, WORKER_STACK, 0).unwrap();
    wait_until(|| sys.thread_state(&first) == ThreadState::Terminated);
    assert_eq!(sys.kernel().task_dels(), 0);

    let second = sys.thread_new("two", || {}, WORKER_STACK, 0).unwrap();
    assert_eq!(sys.kernel().task_dels(), 1);
    wait_until(|| sys.thread_state(&second) == ThreadState::Terminated);

    // A task the kernel already dropped is reclaimed without a delete.
    assert!(sys.task(&second).unwrap().join());
    let third = sys.thread_new("three", || {}, WORKER_STACK, 0).unwrap();
    assert_eq!(sys.kernel().task_dels(), 1);
    assert_eq!(sys.pool_usage().tcb.used, 1);
    wait_until(|| sys.thread_state(&third) == ThreadState::Terminated);
}

#[test]
fn live_threads_exhaust_tcbs_and_stacks() {
    let sys = Arc::new(sys(PoolConfig::builder().tcb_count(2).stack_count(1).build()));
    let gate = Arc::new(sys.sem_new(0).unwrap());

    let parked = {
        let sys_ref = Arc::clone(&sys);
        let gate = Arc::clone(&gate);
        sys.thread_new(
            "parked",
            move || {
                let _ = sys_ref.sem_wait(&gate, 5_000);
            },
            WORKER_STACK,
            0,
        )
        .unwrap()
    };
    assert_eq!(
        sys.thread_new("nostack", || {}, WORKER_STACK, 0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Stack))
    );
    let usage = sys.pool_usage();
    assert_eq!(usage.tcb.used, 1);
    assert_eq!(usage.stack.used, 1);
    assert_eq!(sys.stats().thread.err, 1);

    sys.sem_signal(&gate);
    wait_until(|| sys.thread_state(&parked) == ThreadState::Terminated);
    sys.sem_free(conformance::reclaim(gate));
}

#[test]
fn delete_releases_tcb_and_stack() {
    let sys = Arc::new(sys(PoolConfig::builder().threads(1).build()));
    let gate = Arc::new(sys.sem_new(0).unwrap());

    let parked = {
        let sys_ref = Arc::clone(&sys);
        let gate = Arc::clone(&gate);
        sys.thread_new(
            "parked",
            move || {
                let _ = sys_ref.sem_wait(&gate, 2_000);
            },
            WORKER_STACK,
            3,
        )
        .unwrap()
    };
    wait_until(|| sys.thread_state(&parked) == ThreadState::Running);
    assert_eq!(
        sys.thread_new("blocked", || {}, WORKER_STACK, 0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Thread))
    );

    sys.thread_delete(parked).unwrap();
    let usage = sys.pool_usage();
    assert_eq!(usage.tcb.used, 0);
    assert_eq!(usage.stack.used, 0);
    assert_eq!(sys.stats().thread.used, 0);

    let next = sys.thread_new("next", || {}, WORKER_STACK, 0).unwrap();
    wait_until(|| sys.thread_state(&next) == ThreadState::Terminated);
    // Releases the detached thread of the deleted task.
    sys.sem_signal(&gate);
}

#[test]
fn kernel_task_create_failure_returns_slots() {
    let sys = sys(PoolConfig::default());
    sys.kernel().fail_next_task_create();
    assert_eq!(
        sys.thread_new("doomed", || {}, WORKER_STACK, 0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Thread))
    );
    let usage = sys.pool_usage();
    assert_eq!(usage.tcb.used, 0);
    assert_eq!(usage.stack.used, 0);
    assert_eq!(sys.stats().thread.used, 0);
    assert_eq!(sys.stats().thread.err, 1);
}

#[test]
fn stale_handles_after_free_are_invalid() {
    let sys = sys(PoolConfig::builder().sem_count(1).build());
    let sem = sys.sem_new(0).unwrap();
    let slot = sem.slot();
    sys.sem_free(sem);
    let reused = sys.sem_new(0).unwrap();
    assert_ne!(reused.slot(), slot);
    assert_eq!(reused.slot().index(), slot.index());
    assert!(sys.sem_valid(&reused));
    sys.sem_free(reused);
}

#[test]
fn priority_map_matches_kernel_range() {
    let sys = sys(PoolConfig::default());
    assert_eq!(sys.priorities(), PriorityMap::new(64, 2, 2));
}

#[test]
fn non_holder_unlock_is_refused() {
    let sys = Arc::new(sys(PoolConfig::default()));
    let mutex = Arc::new(sys.mutex_new().unwrap());
    sys.mutex_lock(&mutex).unwrap();

    let other = {
        let sys = Arc::clone(&sys);
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || sys.mutex_unlock(&mutex))
    };
    assert_eq!(
        other.join().unwrap(),
        Err(SysError::Usage(UsageError::NotOwner))
    );
    sys.mutex_unlock(&mutex).unwrap();
    sys.mutex_free(conformance::reclaim(mutex));
}
