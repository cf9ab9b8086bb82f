//! Behavioural checks shared by every port's test suite.
//!
//! Each function builds its own objects on the given system, asserts the
//! contract, and frees everything it created. Threaded checks need the
//! system in an `Arc` so worker closures can call back into it.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::IsrFlag;
use crate::error::{ResourceKind, SysError, UsageError};
use crate::SysArch;

/// Stack requested for worker threads, small enough for every port's limit.
pub const WORKER_STACK: usize = 512;

const JOIN_TIMEOUT_MS: u32 = 10_000;

/// Unwraps an `Arc` once worker threads have dropped their clones.
pub fn reclaim<T>(mut shared: Arc<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match Arc::try_unwrap(shared) {
            Ok(value) => return value,
            Err(still_shared) => {
                assert!(Instant::now() < deadline, "worker kept a handle alive");
                shared = still_shared;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Posts 10, 20, 30, 40 into a 4-slot mailbox, is refused 50, fetches the
/// four in order and then finds the mailbox empty.
pub fn mailbox_scenario<S: SysArch>(sys: &S) {
    let mbox = sys.mbox_new::<usize>(4).expect("mailbox");
    for msg in [10, 20, 30, 40] {
        sys.mbox_trypost(&mbox, msg).expect("room for message");
    }

    let rejected = sys.mbox_trypost(&mbox, 50).expect_err("mailbox is full");
    assert_eq!(rejected.error(), SysError::Full);
    assert_eq!(rejected.into_message(), 50);
    assert_eq!(sys.mbox_len(&mbox), 4);

    for expected in [10, 20, 30, 40] {
        let (msg, elapsed) = sys.mbox_fetch(&mbox, 100).expect("queued message");
        assert_eq!(msg, expected);
        assert!(elapsed >= 1);
    }
    assert_eq!(sys.mbox_tryfetch(&mbox), Err(SysError::Empty));
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// Interleaves posts and fetches so the ring wraps several times.
pub fn mailbox_fifo<S: SysArch>(sys: &S, capacity: usize) {
    let mbox = sys.mbox_new::<usize>(capacity).expect("mailbox");
    let mut next_in = 0usize;
    let mut next_out = 0usize;
    for round in 0..4 * capacity {
        let burst = round % capacity + 1;
        for _ in 0..burst {
            sys.mbox_post(&mbox, next_in);
            next_in += 1;
        }
        assert!(sys.mbox_len(&mbox) <= capacity);
        for _ in 0..burst {
            assert_eq!(sys.mbox_tryfetch(&mbox), Ok(next_out));
            next_out += 1;
        }
    }
    assert_eq!(sys.mbox_len(&mbox), 0);
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// A producer thread blocks on a 2-slot mailbox while the caller drains it.
pub fn mailbox_fifo_across_threads<S: SysArch + 'static>(sys: &Arc<S>, count: usize) {
    let mbox = Arc::new(sys.mbox_new::<usize>(2).expect("mailbox"));

    let producer = {
        let sys = Arc::clone(sys);
        let mbox = Arc::clone(&mbox);
        move || {
            for msg in 0..count {
                sys.mbox_post(&mbox, msg);
            }
        }
    };
    let thread = sys
        .thread_new("producer", producer, WORKER_STACK, 1)
        .expect("producer thread");

    for expected in 0..count {
        let (msg, elapsed) = sys.mbox_fetch(&mbox, JOIN_TIMEOUT_MS).expect("message");
        assert_eq!(msg, expected);
        assert!(elapsed >= 1);
    }
    assert_eq!(sys.mbox_tryfetch(&mbox), Err(SysError::Empty));

    sys.mbox_free(reclaim(mbox)).expect("empty mailbox is freed");
    drop(thread);
}

/// A full mailbox keeps its contents when a non-blocking post is refused.
pub fn trypost_full_leaves_contents<S: SysArch>(sys: &S) {
    let mbox = sys.mbox_new::<u32>(2).expect("mailbox");
    sys.mbox_trypost(&mbox, 1).expect("room");
    sys.mbox_trypost(&mbox, 2).expect("room");

    let rejected = sys.mbox_trypost(&mbox, 3).expect_err("full");
    assert_eq!(rejected.error(), SysError::Full);
    assert_eq!(sys.mbox_len(&mbox), 2);
    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(1));
    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(2));
    assert_eq!(sys.mbox_tryfetch(&mbox), Err(SysError::Empty));
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// Boxed messages survive the trip through the kernel word.
pub fn boxed_messages<S: SysArch>(sys: &S) {
    let mbox = sys.mbox_new::<Box<String>>(2).expect("mailbox");
    sys.mbox_post(&mbox, Box::new(String::from("pbuf")));
    assert!(sys.mbox_trypost(&mbox, Box::new(String::from("netconn"))).is_ok());
    let (first, _) = sys.mbox_fetch(&mbox, 100).expect("message");
    assert_eq!(first.as_str(), "pbuf");
    assert_eq!(sys.mbox_tryfetch(&mbox).expect("message").as_str(), "netconn");
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// An empty mailbox times out after at least `timeout_ms`.
pub fn fetch_times_out<S: SysArch>(sys: &S, timeout_ms: u32) {
    let mbox = sys.mbox_new::<usize>(1).expect("mailbox");
    let before = sys.now_ms();
    assert_eq!(sys.mbox_fetch(&mbox, timeout_ms).map(|(m, _)| m), Err(SysError::Timeout));
    let waited = sys.now_ms().wrapping_sub(before);
    assert!(waited >= timeout_ms, "returned after {waited} ms");
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// Destroying a mailbox with queued messages is refused and reversible.
pub fn free_refuses_non_empty<S: SysArch>(sys: &S) {
    let mbox = sys.mbox_new::<usize>(2).expect("mailbox");
    sys.mbox_post(&mbox, 7);

    let errors_before = sys.stats().mbox.err;
    let busy = sys.mbox_free(mbox).expect_err("mailbox still holds a message");
    assert_eq!(busy.pending, 1);
    assert!(sys.stats().mbox.err > errors_before);

    let mbox = busy.mailbox;
    assert!(sys.mbox_valid(&mbox));
    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(7));
    sys.mbox_free(mbox).expect("empty mailbox is freed");
}

/// A timed-out wait leaves the count at zero.
pub fn sem_timeout_keeps_count<S: SysArch>(sys: &S, timeout_ms: u32) {
    let sem = sys.sem_new(0).expect("semaphore");
    let before = sys.now_ms();
    assert_eq!(sys.sem_wait(&sem, timeout_ms), Err(SysError::Timeout));
    let waited = sys.now_ms().wrapping_sub(before);
    assert!(waited >= timeout_ms, "returned after {waited} ms");

    sys.sem_signal(&sem);
    let elapsed = sys.sem_wait(&sem, timeout_ms).expect("signalled once");
    assert!(elapsed >= 1);
    assert_eq!(sys.sem_wait(&sem, timeout_ms), Err(SysError::Timeout));
    sys.sem_free(sem);
}

/// Binary semaphores saturate at one; `initial > max` is rejected.
pub fn sem_bounded<S: SysArch>(sys: &S) {
    let sem = sys.sem_new_bounded(0, 1).expect("binary semaphore");
    sys.sem_signal(&sem);
    sys.sem_signal(&sem);
    sys.sem_signal(&sem);
    assert!(sys.sem_wait(&sem, 10).is_ok());
    assert_eq!(sys.sem_wait(&sem, 10), Err(SysError::Timeout));
    sys.sem_free(sem);

    let refused = sys.sem_new_bounded(2, 1).map(|_| ());
    assert_eq!(
        refused,
        Err(SysError::Usage(UsageError::CountAboveMax { count: 2, max: 1 }))
    );
}

/// A waiter blocked without a limit wakes up when another thread signals.
pub fn sem_signal_wakes_waiter<S: SysArch + 'static>(sys: &Arc<S>) {
    let sem = Arc::new(sys.sem_new(0).expect("semaphore"));
    let signaller = {
        let sys = Arc::clone(sys);
        let sem = Arc::clone(&sem);
        move || {
            std::thread::sleep(Duration::from_millis(20));
            sys.sem_signal(&sem);
        }
    };
    let thread = sys
        .thread_new("signaller", signaller, WORKER_STACK, 1)
        .expect("signaller thread");

    let elapsed = sys.sem_wait(&sem, crate::WAIT_FOREVER).expect("signalled");
    assert!(elapsed >= 1);
    sys.sem_free(reclaim(sem));
    drop(thread);
}

/// Elapsed time stays small when the tick counter wraps during the wait.
///
/// The system must run on a clock that starts a few ticks below the wrap.
pub fn elapsed_survives_wrap<S: SysArch + 'static>(sys: &Arc<S>) {
    let sem = Arc::new(sys.sem_new(0).expect("semaphore"));
    let signaller = {
        let sys = Arc::clone(sys);
        let sem = Arc::clone(&sem);
        move || {
            std::thread::sleep(Duration::from_millis(30));
            sys.sem_signal(&sem);
        }
    };
    let thread = sys
        .thread_new("wrap", signaller, WORKER_STACK, 1)
        .expect("signaller thread");

    let elapsed = sys.sem_wait(&sem, JOIN_TIMEOUT_MS).expect("signalled");
    assert!((20..JOIN_TIMEOUT_MS).contains(&elapsed), "elapsed {elapsed} ms");
    sys.sem_free(reclaim(sem));
    drop(thread);
}

/// Several threads increment a guarded counter; at most one is inside.
pub fn mutex_exclusion<S: SysArch + 'static>(sys: &Arc<S>, workers: usize, rounds: usize) {
    let mutex = Arc::new(sys.mutex_new().expect("mutex"));
    let done = Arc::new(sys.sem_new(0).expect("semaphore"));
    let inside = Arc::new(AtomicI32::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::with_capacity(workers);
    for _ in 0..workers {
        let sys_ref = Arc::clone(sys);
        let mutex = Arc::clone(&mutex);
        let done = Arc::clone(&done);
        let inside = Arc::clone(&inside);
        let violations = Arc::clone(&violations);
        let total = Arc::clone(&total);
        let worker = move || {
            for _ in 0..rounds {
                if sys_ref.mutex_lock(&mutex).is_err() {
                    violations.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                total.fetch_add(1, Ordering::SeqCst);
                std::thread::yield_now();
                inside.fetch_sub(1, Ordering::SeqCst);
                if sys_ref.mutex_unlock(&mutex).is_err() {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
            }
            sys_ref.sem_signal(&done);
        };
        threads.push(
            sys.thread_new("mutex-worker", worker, WORKER_STACK, 1)
                .expect("worker thread"),
        );
    }

    for _ in 0..workers {
        sys.sem_wait(&done, JOIN_TIMEOUT_MS).expect("worker finished");
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(total.load(Ordering::SeqCst), workers * rounds);

    sys.mutex_free(reclaim(mutex));
    sys.sem_free(reclaim(done));
    drop(threads);
}

/// With room for `limit` mailboxes, the next create fails and the first
/// `limit` keep working.
pub fn exhaust_mailboxes<S: SysArch>(sys: &S, limit: usize) {
    let mailboxes: Vec<_> = (0..limit)
        .map(|_| sys.mbox_new::<usize>(1).expect("mailbox within limit"))
        .collect();
    assert_eq!(
        sys.mbox_new::<usize>(1).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );

    for (msg, mbox) in mailboxes.iter().enumerate() {
        sys.mbox_trypost(mbox, msg).expect("room");
    }
    for (msg, mbox) in mailboxes.iter().enumerate() {
        assert_eq!(sys.mbox_tryfetch(mbox), Ok(msg));
    }
    for mbox in mailboxes {
        sys.mbox_free(mbox).expect("empty mailbox is freed");
    }

    let again = sys.mbox_new::<usize>(1).expect("slot reusable after free");
    sys.mbox_free(again).expect("empty mailbox is freed");
}

/// Same as [`exhaust_mailboxes`] for semaphores.
pub fn exhaust_semaphores<S: SysArch>(sys: &S, limit: usize) {
    let sems: Vec<_> = (0..limit)
        .map(|_| sys.sem_new(0).expect("semaphore within limit"))
        .collect();
    assert_eq!(
        sys.sem_new(0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Semaphore))
    );
    for sem in &sems {
        sys.sem_signal(sem);
        assert!(sys.sem_wait(sem, 10).is_ok());
    }
    for sem in sems {
        sys.sem_free(sem);
    }
    let again = sys.sem_new(0).expect("slot reusable after free");
    sys.sem_free(again);
}

/// Same as [`exhaust_mailboxes`] for mutexes.
pub fn exhaust_mutexes<S: SysArch>(sys: &S, limit: usize) {
    let mutexes: Vec<_> = (0..limit)
        .map(|_| sys.mutex_new().expect("mutex within limit"))
        .collect();
    assert_eq!(
        sys.mutex_new().map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mutex))
    );
    for mutex in &mutexes {
        sys.mutex_lock(mutex).expect("lock");
        sys.mutex_unlock(mutex).expect("unlock");
    }
    for mutex in mutexes {
        sys.mutex_free(mutex);
    }
}

/// Suspending calls are refused inside an interrupt; the interrupt-safe
/// calls work, and a post into a full mailbox is dropped.
///
/// `isr` must be the context the system was built with.
pub fn isr_routing<S: SysArch>(sys: &S, isr: &IsrFlag) {
    let mbox = sys.mbox_new::<usize>(1).expect("mailbox");
    let sem = sys.sem_new(0).expect("semaphore");
    let mutex = sys.mutex_new().expect("mutex");

    let guard = isr.enter();
    let refused = Err(SysError::Usage(UsageError::BlockingInIsr));
    assert_eq!(sys.mbox_fetch(&mbox, 10).map(|_| ()), refused);
    assert_eq!(sys.sem_wait(&sem, 10).map(|_| ()), refused);
    assert_eq!(sys.mutex_lock(&mutex), refused);

    sys.mbox_trypost(&mbox, 1).expect("room");
    let errors_before = sys.stats().mbox.err;
    sys.mbox_post(&mbox, 2);
    assert_eq!(sys.mbox_len(&mbox), 1);
    assert!(sys.stats().mbox.err > errors_before);

    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(1));
    sys.mbox_post(&mbox, 3);
    sys.sem_signal(&sem);
    guard.finish();

    assert_eq!(sys.mbox_tryfetch(&mbox), Ok(3));
    assert!(sys.sem_wait(&sem, 10).is_ok());
    sys.mbox_free(mbox).expect("empty mailbox is freed");
    sys.sem_free(sem);
    sys.mutex_free(mutex);
}

/// Runs every single-threaded check.
pub fn run_basic<S: SysArch>(sys: &S) {
    mailbox_scenario(sys);
    mailbox_fifo(sys, 3);
    trypost_full_leaves_contents(sys);
    boxed_messages(sys);
    free_refuses_non_empty(sys);
    fetch_times_out(sys, 30);
    sem_timeout_keeps_count(sys, 30);
    sem_bounded(sys);
}

/// Runs every check that spawns threads.
pub fn run_threaded<S: SysArch + 'static>(sys: &Arc<S>) {
    mailbox_fifo_across_threads(sys, 64);
    sem_signal_wakes_waiter(sys);
    mutex_exclusion(sys, 4, 200);
}
