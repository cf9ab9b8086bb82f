//! # sysarch
//!
//! Portable operating-system abstraction layer for an embedded protocol
//! stack. The stack is written once against [`SysArch`] and runs on any
//! scheduler that has a port crate:
//!
//! - `sysarch-port-posix` – host threads, with the mailbox ring and thread
//!   table kept by the layer.
//! - `sysarch-port-heap` – tick-based RTOS with heap-allocated queues and
//!   `FromISR` call variants.
//! - `sysarch-port-pool` – tick-based RTOS with static memory pools only; the
//!   layer owns every control block and thread stack.
//!
//! ## Module Overview
//! - [`arch`]    – the consumer-facing contract and thread states.
//! - [`error`]   – error taxonomy shared by every port.
//! - [`mail`]    – conversion of typed messages to kernel message words.
//! - [`time`]    – tick sources, tick/millisecond conversion, wraparound.
//! - [`context`] – task vs. interrupt execution context.
//! - [`pool`]    – fixed-capacity slot pools with generation-checked handles.
//! - [`stats`]   – per-kind usage counters.
//! - [`host`]    – blocking primitives for ports and simulators on `std`.
//!
//! Without the default `std` feature the crate is `no_std + alloc`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod arch;
pub mod context;
pub mod error;
pub mod mail;
pub mod pool;
pub mod stats;
pub mod sync;
pub mod time;

#[cfg(feature = "std")]
pub mod host;

#[cfg(feature = "testing")]
pub mod conformance;

pub use arch::{
    thread_name, AtomicThreadState, SysArch, ThreadEntry, ThreadName, ThreadState, THREAD_NAME_LEN,
};
pub use context::{ExecContext, IsrFlag, IsrGuard, TaskContext, INSIDE_ISR};
pub use error::{MailboxBusy, ResourceKind, SysError, SysResult, TryPostError, UsageError};
pub use mail::Mail;
pub use pool::{PoolStats, SlotId, SlotPool};
pub use stats::{StatCounter, StatSnapshot, SysStats, SysStatsSnapshot};
pub use time::{ManualTicks, Stopwatch, Tick, TickSource, WAIT_FOREVER};

#[cfg(feature = "std")]
pub use time::MonotonicTicks;

#[cfg(test)]
mod tests;
