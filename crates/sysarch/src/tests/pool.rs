use super::init_logging;
use crate::pool::{PoolStats, SlotPool};

#[test]
fn stats_track_minimum_free() {
    let pool = SlotPool::new("tcb", 3, || 0u32);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    pool.release(a);

    let stats = pool.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.used, 1);
    assert_eq!(stats.free, 2);
    assert_eq!(stats.min_free, 1);
    assert_eq!(stats.utilization(), 33);
    pool.release(b);
}

#[test]
fn exhausted_pool_returns_none() {
    init_logging();
    let pool = SlotPool::new("mbox", 2, || ());
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    assert!(pool.acquire().is_none());
    assert!(pool.stats().is_exhausted());

    assert!(pool.release(a));
    assert!(pool.acquire().is_some());
    assert!(pool.is_live(b));
}

#[test]
fn stale_id_does_not_resolve() {
    init_logging();
    let pool = SlotPool::new("sem", 1, || 5u8);
    let first = pool.acquire().unwrap();
    assert_eq!(pool.get(first), Some(&5));
    assert!(pool.release(first));

    let second = pool.acquire().unwrap();
    assert_eq!(first.index(), second.index());
    assert_ne!(first.generation(), second.generation());
    assert!(pool.get(first).is_none());
    assert!(!pool.release(first));
    assert!(pool.is_live(second));
}

#[test]
fn double_release_is_refused() {
    init_logging();
    let pool = SlotPool::new("mutex", 2, || ());
    let id = pool.acquire().unwrap();
    assert!(pool.release(id));
    assert!(!pool.release(id));
    let stats = pool.stats();
    assert_eq!(stats.used, 0);
    assert_eq!(stats.free, 2);
    assert_eq!(stats.min_free, 1);
    assert_ne!(stats, PoolStats::new(2));
}

#[test]
fn live_ids_lists_acquired_slots() {
    let pool = SlotPool::new("stack", 4, || [0u32; 8]);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    let c = pool.acquire().unwrap();
    pool.release(b);

    let live = pool.live_ids();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&a));
    assert!(live.contains(&c));
}

#[test]
fn empty_pool_never_hands_out_slots() {
    let pool: SlotPool<u8> = SlotPool::new("none", 0, || 0);
    assert!(pool.acquire().is_none());
    assert_eq!(pool.capacity(), 0);
}
