//! The shared behavioural checks, run against the POSIX port.

use std::sync::Arc;
use std::time::Duration;

use sysarch::conformance;
use sysarch::{IsrFlag, MonotonicTicks, SysArch, SysError, ThreadState, UsageError};
use sysarch_port_posix::{PosixConfig, PosixSys};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sys(config: PosixConfig) -> PosixSys<Arc<IsrFlag>> {
    init_logging();
    let clock = MonotonicTicks::new(config.tick_rate_hz);
    PosixSys::with_parts(config, Arc::new(IsrFlag::new()), clock)
}

#[test]
fn basic_contract() {
    conformance::run_basic(&sys(PosixConfig::default()));
}

#[test]
fn threaded_contract() {
    conformance::run_threaded(&Arc::new(sys(PosixConfig::default())));
}

#[test]
fn mailbox_table_exhaustion() {
    let sys = sys(PosixConfig::builder().mbox_max(3).build());
    conformance::exhaust_mailboxes(&sys, 3);
}

#[test]
fn semaphore_budget_exhaustion() {
    let sys = sys(PosixConfig::builder().sem_max(4).build());
    conformance::exhaust_semaphores(&sys, 4);
}

#[test]
fn mutex_budget_exhaustion() {
    let sys = sys(PosixConfig::builder().sem_max(2).build());
    conformance::exhaust_mutexes(&sys, 2);
}

#[test]
fn interrupt_context_routing() {
    let flag = Arc::new(IsrFlag::new());
    let clock = MonotonicTicks::new(1000);
    let sys = PosixSys::with_parts(PosixConfig::default(), Arc::clone(&flag), clock);
    conformance::isr_routing(&sys, &flag);
}

#[test]
fn interrupt_post_to_waiting_receiver_requests_yield() {
    let flag = Arc::new(IsrFlag::new());
    let sys = Arc::new(PosixSys::with_parts(
        PosixConfig::default(),
        Arc::clone(&flag),
        MonotonicTicks::new(1000),
    ));
    let mbox = Arc::new(sys.mbox_new::<u32>(1).unwrap());

    let receiver = {
        let sys = Arc::clone(&sys);
        let mbox = Arc::clone(&mbox);
        std::thread::spawn(move || sys.mbox_fetch(&mbox, 5_000).map(|(msg, _)| msg))
    };
    std::thread::sleep(Duration::from_millis(50));

    let guard = flag.enter();
    sys.mbox_post(&mbox, 99);
    assert!(guard.finish());

    assert_eq!(receiver.join().unwrap(), Ok(99));
    sys.mbox_free(conformance::reclaim(mbox)).unwrap();
}

#[test]
fn elapsed_across_counter_wrap() {
    init_logging();
    let clock = MonotonicTicks::with_offset(u32::MAX - 5, 1000);
    let sys = PosixSys::with_parts(PosixConfig::default(), Arc::new(IsrFlag::new()), clock);
    conformance::elapsed_survives_wrap(&Arc::new(sys));
}

#[test]
fn thread_lifecycle_and_table_reuse() {
    let sys = Arc::new(sys(PosixConfig::builder().thread_max(1).build()));

    let gate = Arc::new(sys.sem_new(0).unwrap());
    let worker = {
        let sys = Arc::clone(&sys);
        let gate = Arc::clone(&gate);
        move || {
            let _ = sys.sem_wait(&gate, 5_000);
        }
    };
    let thread = sys.thread_new("tcpip", worker, 4096, 3).unwrap();
    let (name, priority) = sys.thread_info(&thread).unwrap();
    assert_eq!(name.as_str(), "tcpip");
    assert_eq!(priority, 3);

    assert_eq!(
        sys.thread_new("extra", || {}, 4096, 1).map(|_| ()),
        Err(SysError::OutOfResources(sysarch::ResourceKind::Thread))
    );

    sys.sem_signal(&gate);
    thread.join().unwrap();

    let again = sys.thread_new("again", || {}, 4096, 1).unwrap();
    again.join().unwrap();
    assert_eq!(sys.stats().thread.used, 0);
    assert_eq!(sys.stats().thread.max, 1);
}

#[test]
fn finished_thread_reports_terminated() {
    let sys = sys(PosixConfig::default());
    let thread = sys.thread_new("short", || {}, 0, 0).unwrap();
    let state_before_join = sys.thread_state(&thread);
    assert!(matches!(
        state_before_join,
        ThreadState::Created | ThreadState::Running | ThreadState::Terminated
    ));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sys.thread_state(&thread), ThreadState::Terminated);
    assert_eq!(sys.thread_delete(thread), Err(SysError::Unsupported));
}

#[test]
fn oversized_stack_is_a_usage_error() {
    let sys = sys(PosixConfig::builder().stack_size_max(8192).build());
    assert_eq!(
        sys.thread_new("big", || {}, 8193, 1).map(|_| ()),
        Err(SysError::Usage(UsageError::StackTooLarge { requested: 8193, max: 8192 }))
    );
}

#[test]
fn unlock_by_non_holder_is_refused() {
    let sys = Arc::new(sys(PosixConfig::default()));
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

#[test]
fn owned_handles_read_valid() {
    let sys = sys(PosixConfig::default());
    let mbox = sys.mbox_new::<usize>(2).unwrap();
    let sem = sys.sem_new(0).unwrap();
    let mutex = sys.mutex_new().unwrap();
    assert!(sys.mbox_valid(&mbox));
    assert!(sys.sem_valid(&sem));
    assert!(sys.mutex_valid(&mutex));
    sys.mbox_free(mbox).unwrap();
    sys.sem_free(sem);
    sys.mutex_free(mutex);
    assert_eq!(sys.stats().sem.used, 0);
}
