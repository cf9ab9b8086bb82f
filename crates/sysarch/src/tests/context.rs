use crate::context::{ExecContext, IsrFlag, TaskContext};

#[test]
fn flag_reports_interrupt_scope() {
    let flag = IsrFlag::new();
    assert!(!flag.in_isr());

    let guard = flag.enter();
    assert!(flag.in_isr());
    assert!(!guard.finish());
    assert!(!flag.in_isr());
}

#[test]
fn pending_yield_is_consumed_at_outermost_exit() {
    let flag = IsrFlag::new();
    let outer = flag.enter();
    let inner = flag.enter();
    flag.request_yield();
    assert_eq!(flag.nesting(), 2);

    assert!(!inner.finish());
    assert!(flag.is_yield_pending());
    assert!(outer.finish());
    assert!(!flag.is_yield_pending());
}

#[test]
fn dropped_guard_leaves_interrupt() {
    let flag = IsrFlag::new();
    {
        let _guard = flag.enter();
        assert!(flag.in_isr());
    }
    assert!(!flag.in_isr());
}

#[test]
fn task_context_never_reports_isr() {
    let ctx = TaskContext;
    ctx.request_yield();
    assert!(!ctx.in_isr());
}
