//! Simulated interrupt context, scoped to the calling thread.
//!
//! The driver thread raises "interrupts" by running a closure with the flag
//! set. Other threads keep running in task context meanwhile, which a
//! process-wide flag could not model.

use std::cell::Cell;

use sysarch::ExecContext;

thread_local! {
    static IN_IRQ: Cell<bool> = const { Cell::new(false) };
    static YIELD_PENDING: Cell<bool> = const { Cell::new(false) };
}

/// Execution context reading the current thread's interrupt flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadIrq;

impl ExecContext for ThreadIrq {
    fn in_isr(&self) -> bool {
        IN_IRQ.with(Cell::get)
    }

    fn request_yield(&self) {
        YIELD_PENDING.with(|pending| pending.set(true));
    }
}

/// Runs `handler` as an interrupt on this thread.
///
/// Returns its result and whether it asked for a context switch on exit.
pub fn raise<R>(handler: impl FnOnce() -> R) -> (R, bool) {
    YIELD_PENDING.with(|pending| pending.set(false));
    IN_IRQ.with(|flag| flag.set(true));
    let result = handler();
    IN_IRQ.with(|flag| flag.set(false));
    (result, YIELD_PENDING.with(|pending| pending.replace(false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_scoped_to_handler() {
        assert!(!ThreadIrq.in_isr());
        let (inside, yielded) = raise(|| ThreadIrq.in_isr());
        assert!(inside);
        assert!(!yielded);
        assert!(!ThreadIrq.in_isr());
    }

    #[test]
    fn yield_request_is_reported_once() {
        let ((), yielded) = raise(|| ThreadIrq.request_yield());
        assert!(yielded);
        let ((), yielded) = raise(|| {});
        assert!(!yielded);
    }

    #[test]
    fn other_threads_stay_in_task_context() {
        let (seen, _) = raise(|| std::thread::spawn(|| ThreadIrq.in_isr()).join().unwrap());
        assert!(!seen);
    }
}
