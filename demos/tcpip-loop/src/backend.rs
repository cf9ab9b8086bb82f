//! Backend selected at build time.

use std::sync::Arc;

use crate::irq::ThreadIrq;

#[cfg(any(
    all(feature = "posix", feature = "heap-sim"),
    all(feature = "posix", feature = "pool-sim"),
    all(feature = "heap-sim", feature = "pool-sim"),
))]
compile_error!("enable exactly one of the `posix`, `heap-sim` and `pool-sim` features");

#[cfg(not(any(feature = "posix", feature = "heap-sim", feature = "pool-sim")))]
compile_error!("enable one of the `posix`, `heap-sim` and `pool-sim` features");

#[cfg(feature = "posix")]
mod selected {
    use sysarch::MonotonicTicks;
    use sysarch_port_posix::{PosixConfig, PosixSys};

    use super::*;

    pub const NAME: &str = "posix";

    pub type Sys = PosixSys<ThreadIrq, MonotonicTicks>;

    pub fn build(tick_rate_hz: u32) -> Arc<Sys> {
        let config = PosixConfig::builder().tick_rate_hz(tick_rate_hz).build();
        Arc::new(PosixSys::with_parts(config, ThreadIrq, MonotonicTicks::new(tick_rate_hz)))
    }
}

#[cfg(feature = "heap-sim")]
mod selected {
    use sysarch_port_heap::sim::SimHeapKernel;
    use sysarch_port_heap::HeapSys;

    use super::*;

    pub const NAME: &str = "heap-sim";

    pub type Sys = HeapSys<SimHeapKernel, ThreadIrq>;

    pub fn build(tick_rate_hz: u32) -> Arc<Sys> {
        Arc::new(HeapSys::with_context(SimHeapKernel::new(tick_rate_hz), ThreadIrq))
    }
}

#[cfg(feature = "pool-sim")]
mod selected {
    use sysarch_port_pool::sim::SimPoolKernel;
    use sysarch_port_pool::{PoolConfig, PoolSys};

    use super::*;

    pub const NAME: &str = "pool-sim";

    pub type Sys = PoolSys<SimPoolKernel, ThreadIrq>;

    pub fn build(tick_rate_hz: u32) -> Arc<Sys> {
        let kernel = SimPoolKernel::new(tick_rate_hz);
        Arc::new(PoolSys::with_context(kernel, PoolConfig::default(), ThreadIrq))
    }
}

pub use selected::{build, Sys, NAME};
