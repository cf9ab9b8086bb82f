//! tcpip-loop: a protocol-stack style message loop on one sysarch backend.
//!
//! The backend is picked at build time with exactly one of the `posix`
//! (default), `heap-sim` or `pool-sim` features:
//!
//! ```text
//! cargo run -p tcpip-loop -- --packets 5000 --irq-every 3
//! cargo run -p tcpip-loop --no-default-features --features pool-sim
//! ```

mod backend;
mod irq;
mod stack;

use clap::Parser;
use log::info;

use crate::stack::LoopConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Message loop of a protocol stack on a sysarch backend")]
struct Opts {
    /// Packets the driver hands to the tcpip thread.
    #[arg(long, default_value_t = 1000)]
    packets: usize,

    /// Application threads making blocking API calls.
    #[arg(long, default_value_t = 2)]
    apps: usize,

    #[arg(long = "calls", default_value_t = 50, value_name = "N")]
    calls_per_app: usize,

    /// Capacity of the tcpip mailbox.
    #[arg(long, default_value_t = 16)]
    capacity: usize,

    /// Post every n-th packet from interrupt context (0 = never).
    #[arg(long, default_value_t = 4, value_name = "N")]
    irq_every: usize,

    #[arg(long = "call-timeout", default_value_t = 1000, value_name = "MS")]
    call_timeout_ms: u32,

    /// Stack size, in the unit of the backend.
    #[arg(long = "stack", default_value_t = 512)]
    stack_size: usize,

    #[arg(long = "tick-rate", default_value_t = 1000, value_name = "HZ")]
    tick_rate_hz: u32,
}

impl Opts {
    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            packets: self.packets,
            apps: self.apps,
            calls_per_app: self.calls_per_app,
            capacity: self.capacity,
            irq_every: self.irq_every,
            call_timeout_ms: self.call_timeout_ms,
            stack_size: self.stack_size,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let sys = backend::build(opts.tick_rate_hz);
    info!("tcpip-loop on the {} backend", backend::NAME);

    let report = stack::run(&sys, &opts.loop_config())?;
    print!("{report}");
    Ok(())
}
