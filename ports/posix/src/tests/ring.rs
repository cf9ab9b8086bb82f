use crate::mailbox::Ring;

#[test]
fn ring_wraps_in_fifo_order() {
    let mut ring = Ring::default();
    ring.reset(3);
    for round in 0..5 {
        assert!(ring.push(round * 10));
        assert!(ring.push(round * 10 + 1));
        assert_eq!(ring.pop(), Some(round * 10));
        assert_eq!(ring.pop(), Some(round * 10 + 1));
    }
    assert_eq!(ring.len(), 0);
}

#[test]
fn full_ring_refuses_push() {
    let mut ring = Ring::default();
    ring.reset(2);
    assert!(ring.push(1));
    assert!(ring.push(2));
    assert!(!ring.push(3));
    assert_eq!(ring.len(), 2);
    assert_eq!(ring.capacity(), 2);
}

#[test]
fn reset_discards_old_contents() {
    let mut ring = Ring::default();
    ring.reset(4);
    ring.push(9);
    ring.reset(1);
    assert_eq!(ring.pop(), None);
    assert!(ring.push(5));
    assert_eq!(ring.pop(), Some(5));
}
