//! Tick sources and tick/millisecond conversion.
//!
//! Kernels count time in ticks of a free-running counter that wraps at its
//! period. The layer reports elapsed time in milliseconds, so every blocking
//! call samples the counter before and after the wait and converts the
//! difference here.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::sync::Arc;

/// Raw kernel tick counter value.
pub type Tick = u32;

/// Modulus of a 32-bit tick counter (`max_tick + 1`).
pub const TICK_PERIOD: u64 = 1 << 32;

/// Timeout value meaning "wait until the operation completes".
pub const WAIT_FOREVER: u32 = 0;

/// Largest elapsed value reported. `u32::MAX` is the C-side timeout sentinel.
pub const MAX_ELAPSED_MS: u32 = u32::MAX - 1;

/// Largest finite tick timeout. `u32::MAX` means "forever" to heap kernels.
pub const MAX_TIMEOUT_TICKS: u32 = u32::MAX - 1;

/// Free-running tick counter of a scheduler.
pub trait TickSource: Send + Sync {
    /// Current counter value.
    fn now(&self) -> Tick;

    /// Ticks per second.
    fn rate_hz(&self) -> u32;

    /// Counter modulus; 2^32 for a plain 32-bit counter.
    fn period(&self) -> u64 {
        TICK_PERIOD
    }
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn rate_hz(&self) -> u32 {
        (**self).rate_hz()
    }

    fn period(&self) -> u64 {
        (**self).period()
    }
}

impl<T: TickSource + ?Sized> TickSource for Arc<T> {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn rate_hz(&self) -> u32 {
        (**self).rate_hz()
    }

    fn period(&self) -> u64 {
        (**self).period()
    }
}

/// Ticks between two counter samples, allowing for one wrap.
pub fn elapsed_ticks(start: Tick, end: Tick, period: u64) -> u64 {
    if end >= start {
        u64::from(end - start)
    } else {
        (period - u64::from(start)) + u64::from(end)
    }
}

/// Converts ticks to milliseconds, saturating at [`MAX_ELAPSED_MS`].
pub fn ticks_to_ms(ticks: u64, rate_hz: u32) -> u32 {
    let ms = ticks.saturating_mul(1000) / u64::from(rate_hz.max(1));
    ms.min(u64::from(MAX_ELAPSED_MS)) as u32
}

/// Converts a millisecond timeout to ticks.
///
/// Zero stays zero. Any other value rounds up to whole ticks, so a timed
/// wait never expires before `ms` and a short delay never turns into "wait
/// forever" or "do not wait".
pub fn ms_to_ticks(ms: u32, rate_hz: u32) -> u32 {
    if ms == 0 {
        return 0;
    }
    let ticks = (u64::from(ms) * u64::from(rate_hz)).div_ceil(1000);
    ticks.clamp(1, u64::from(MAX_TIMEOUT_TICKS)) as u32
}

/// Reported elapsed time is never zero for a successful wait.
pub fn normalize_elapsed(ms: u32) -> u32 {
    ms.max(1)
}

/// Milliseconds since the counter started, wrapping with the counter.
pub fn now_ms<S: TickSource + ?Sized>(clock: &S) -> u32 {
    let ms = u64::from(clock.now()) * 1000 / u64::from(clock.rate_hz().max(1));
    ms as u32
}

/// Counter sample taken at the start of a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    start: Tick,
}

impl Stopwatch {
    pub fn start<S: TickSource + ?Sized>(clock: &S) -> Self {
        Self { start: clock.now() }
    }

    pub fn started_at(start: Tick) -> Self {
        Self { start }
    }

    pub fn elapsed_ticks<S: TickSource + ?Sized>(&self, clock: &S) -> u64 {
        elapsed_ticks(self.start, clock.now(), clock.period())
    }

    /// Elapsed milliseconds, normalised to at least 1.
    pub fn elapsed_ms<S: TickSource + ?Sized>(&self, clock: &S) -> u32 {
        normalize_elapsed(ticks_to_ms(self.elapsed_ticks(clock), clock.rate_hz()))
    }
}

/// Tick counter advanced explicitly, for tests and tick-less targets.
pub struct ManualTicks {
    now: AtomicU32,
    rate_hz: u32,
}

impl ManualTicks {
    pub const fn new(rate_hz: u32) -> Self {
        Self::starting_at(0, rate_hz)
    }

    pub const fn starting_at(tick: Tick, rate_hz: u32) -> Self {
        Self {
            now: AtomicU32::new(tick),
            rate_hz,
        }
    }

    /// Advances the counter, wrapping at 2^32.
    pub fn advance(&self, ticks: u32) {
        self.now.fetch_add(ticks, Ordering::AcqRel);
    }

    pub fn set(&self, tick: Tick) {
        self.now.store(tick, Ordering::Release);
    }
}

impl TickSource for ManualTicks {
    fn now(&self) -> Tick {
        self.now.load(Ordering::Acquire)
    }

    fn rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

impl fmt::Debug for ManualTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTicks")
            .field("now", &self.now())
            .field("rate_hz", &self.rate_hz)
            .finish()
    }
}

#[cfg(feature = "std")]
pub use monotonic::MonotonicTicks;

#[cfg(feature = "std")]
mod monotonic {
    use std::time::{Duration, Instant};

    use super::{Tick, TickSource};

    const NSEC_PER_SEC: u128 = 1_000_000_000;

    /// Tick counter derived from the host monotonic clock.
    ///
    /// The counter starts at `offset` and wraps at 2^32 like a kernel
    /// counter, which lets tests start close to the wrap point.
    #[derive(Debug, Clone, Copy)]
    pub struct MonotonicTicks {
        epoch: Instant,
        offset: Tick,
        rate_hz: u32,
    }

    impl MonotonicTicks {
        pub fn new(rate_hz: u32) -> Self {
            Self::with_offset(0, rate_hz)
        }

        pub fn with_offset(offset: Tick, rate_hz: u32) -> Self {
            Self {
                epoch: Instant::now(),
                offset,
                rate_hz: rate_hz.max(1),
            }
        }

        /// Host duration of `ticks` ticks.
        pub fn ticks_to_duration(&self, ticks: u32) -> Duration {
            let nanos = u128::from(ticks) * NSEC_PER_SEC / u128::from(self.rate_hz);
            Duration::from_nanos(nanos as u64)
        }
    }

    impl TickSource for MonotonicTicks {
        fn now(&self) -> Tick {
            let ticks = self.epoch.elapsed().as_nanos() * u128::from(self.rate_hz) / NSEC_PER_SEC;
            self.offset.wrapping_add(ticks as u32)
        }

        fn rate_hz(&self) -> u32 {
            self.rate_hz
        }
    }
}
