use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::init_logging;
use crate::host::{BoundedQueue, HostSemaphore, Wait};

#[test]
fn semaphore_times_out_without_decrement() {
    init_logging();
    let sem = HostSemaphore::new(0);
    let started = Instant::now();
    assert!(!sem.wait_for(Duration::from_millis(20)));
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(sem.count(), 0);
}

#[test]
fn bounded_semaphore_refuses_post_at_max() {
    let sem = HostSemaphore::bounded(1, 1);
    assert!(!sem.post());
    assert!(sem.try_wait());
    assert!(!sem.try_wait());
    assert!(sem.post());
}

#[test]
fn semaphore_post_wakes_waiter() {
    let sem = Arc::new(HostSemaphore::new(0));
    let poster = {
        let sem = Arc::clone(&sem);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sem.post();
        })
    };
    sem.wait();
    poster.join().unwrap();
    assert_eq!(sem.count(), 0);
}

#[test]
fn queue_is_fifo_and_bounded() {
    let queue = BoundedQueue::new(2);
    assert!(queue.push(1, Wait::No));
    assert!(queue.push(2, Wait::No));
    assert!(!queue.push(3, Wait::No));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop(Wait::No), Some(1));
    assert_eq!(queue.pop(Wait::No), Some(2));
    assert_eq!(queue.pop(Wait::No), None);
}

#[test]
fn queue_pop_times_out() {
    let queue = BoundedQueue::new(1);
    let started = Instant::now();
    assert_eq!(queue.pop(Wait::For(Duration::from_millis(15))), None);
    assert!(started.elapsed() >= Duration::from_millis(15));
}

#[test]
fn blocked_sender_resumes_after_pop() {
    let queue = Arc::new(BoundedQueue::new(1));
    assert!(queue.push(10, Wait::No));
    let sender = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push(20, Wait::Forever))
    };
    thread::sleep(Duration::from_millis(10));
    assert_eq!(queue.pop(Wait::Forever), Some(10));
    assert!(sender.join().unwrap());
    assert_eq!(queue.pop(Wait::Forever), Some(20));
}

#[test]
fn reset_empties_queue() {
    let queue = BoundedQueue::new(4);
    queue.push(1, Wait::No);
    queue.reset(8);
    assert!(queue.is_empty());
    assert_eq!(queue.capacity(), 8);
}
