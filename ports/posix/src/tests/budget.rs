use sysarch::{ResourceKind, SysArch, SysError};

use crate::{PosixConfig, PosixSys};

#[test]
fn mailboxes_draw_two_semaphores_each() {
    let sys = PosixSys::new(PosixConfig::builder().sem_max(5).mbox_max(8).build());

    let first = sys.mbox_new::<usize>(4).unwrap();
    let second = sys.mbox_new::<usize>(4).unwrap();
    assert_eq!(sys.semaphores_in_use(), 4);

    let sem = sys.sem_new(0).unwrap();
    assert_eq!(
        sys.mbox_new::<usize>(4).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    assert_eq!(
        sys.mutex_new().map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mutex))
    );

    sys.sem_free(sem);
    sys.mbox_free(first).unwrap();
    sys.mbox_free(second).unwrap();
    assert_eq!(sys.semaphores_in_use(), 0);
}

#[test]
fn capacity_above_table_slot_size_is_refused() {
    let sys = PosixSys::new(PosixConfig::builder().mbox_size(8).build());
    assert_eq!(
        sys.mbox_new::<usize>(9).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    assert_eq!(
        sys.mbox_new::<usize>(0).map(|_| ()),
        Err(SysError::OutOfResources(ResourceKind::Mailbox))
    );
    assert_eq!(sys.stats().mbox.err, 2);
    assert_eq!(sys.semaphores_in_use(), 0);
}
