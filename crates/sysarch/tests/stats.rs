//! Tests for the usage counters and error formatting.

use sysarch::{ResourceKind, SysError, SysStats, ThreadState, TryPostError, UsageError};

#[test]
fn counters_track_high_water_mark() {
    let stats = SysStats::new();
    stats.mbox.on_create();
    stats.mbox.on_create();
    stats.mbox.on_free();
    stats.mbox.on_create();
    stats.mbox.on_error();

    let snap = stats.snapshot().mbox;
    assert_eq!(snap.used, 2);
    assert_eq!(snap.max, 2);
    assert_eq!(snap.err, 1);
}

#[test]
fn free_never_underflows() {
    let stats = SysStats::new();
    stats.sem.on_free();
    assert_eq!(stats.snapshot().sem.used, 0);
}

#[test]
fn stacks_are_counted_with_threads() {
    let stats = SysStats::new();
    stats.counter(ResourceKind::Stack).on_error();
    assert_eq!(stats.snapshot().thread.err, 1);
}

#[test]
fn errors_render_readable_messages() {
    assert_eq!(
        SysError::OutOfResources(ResourceKind::Mailbox).to_string(),
        "out of mailbox resources"
    );
    assert_eq!(
        SysError::from(UsageError::StackTooLarge { requested: 8192, max: 4096 }).to_string(),
        "usage error: stack of 8192 exceeds maximum of 4096"
    );
    assert_eq!(ThreadState::Terminated.to_string(), "terminated");
}

#[test]
fn rejected_post_returns_message() {
    let rejected = TryPostError::full(String::from("segment"));
    assert_eq!(rejected.error(), SysError::Full);
    assert_eq!(rejected.to_string(), "post rejected: mailbox is full");
    assert_eq!(rejected.into_message(), "segment");
}

#[test]
fn thread_names_are_truncated() {
    let name = sysarch::thread_name("tcpip_thread_with_a_long_name");
    assert_eq!(name.len(), sysarch::THREAD_NAME_LEN);
    assert!(name.starts_with("tcpip_thread"));
}
