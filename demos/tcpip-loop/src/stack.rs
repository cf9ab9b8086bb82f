//! A miniature protocol-stack core.
//!
//! One `tcpip` thread owns the stack and drains a single mailbox. Network
//! packets arrive from the driver, part of them posted from (simulated)
//! interrupt context. Application threads make blocking API calls: each call
//! travels through the mailbox with a reply semaphore that the `tcpip`
//! thread signals once the call is served.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use log::{debug, error, info, trace, warn};
use sysarch::{SysArch, SysError, SysStatsSnapshot};

use crate::irq;

const TCPIP_PRIORITY: i32 = 3;
const APP_PRIORITY: i32 = 1;
const IDLE_TIMEOUT_MS: u32 = 100;
const JOIN_TIMEOUT_MS: u32 = 10_000;

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub packets: usize,
    pub apps: usize,
    pub calls_per_app: usize,
    pub capacity: usize,
    /// Every n-th packet is posted from interrupt context; 0 disables.
    pub irq_every: usize,
    pub call_timeout_ms: u32,
    pub stack_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            packets: 1000,
            apps: 2,
            calls_per_app: 50,
            capacity: 16,
            irq_every: 4,
            call_timeout_ms: 1000,
            stack_size: 512,
        }
    }
}

enum Msg<S: SysArch> {
    Packet(usize),
    Call { app: usize, reply: Arc<S::Semaphore> },
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicUsize,
    served: AtomicUsize,
    idle: AtomicUsize,
    call_timeouts: AtomicUsize,
    stale_replies: AtomicUsize,
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct Report {
    pub packets_sent: usize,
    pub packets_received: usize,
    pub irq_yields: usize,
    pub calls_served: usize,
    pub call_timeouts: usize,
    /// Reply tokens still pending once an app finished its calls.
    pub stale_replies: usize,
    pub idle_wakeups: usize,
    pub elapsed_ms: u32,
    pub stats: SysStatsSnapshot,
}

impl Report {
    /// Packets lost to a full mailbox in interrupt context.
    pub fn packets_dropped(&self) -> usize {
        self.packets_sent - self.packets_received
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "elapsed        {} ms", self.elapsed_ms)?;
        writeln!(
            f,
            "packets        {} sent, {} received, {} dropped",
            self.packets_sent,
            self.packets_received,
            self.packets_dropped()
        )?;
        writeln!(f, "irq yields     {}", self.irq_yields)?;
        writeln!(
            f,
            "api calls      {} served, {} timed out, {} stale replies",
            self.calls_served, self.call_timeouts, self.stale_replies
        )?;
        writeln!(f, "idle wakeups   {}", self.idle_wakeups)?;
        for (kind, stat) in [
            ("mbox", self.stats.mbox),
            ("sem", self.stats.sem),
            ("mutex", self.stats.mutex),
            ("thread", self.stats.thread),
        ] {
            writeln!(f, "{kind:<6} used {:>3}  max {:>3}  err {:>3}", stat.used, stat.max, stat.err)?;
        }
        Ok(())
    }
}

/// Waits until every other owner of `shared` has let go.
fn unshare<T>(mut shared: Arc<T>, what: &str) -> anyhow::Result<T> {
    let deadline = Instant::now() + Duration::from_millis(u64::from(JOIN_TIMEOUT_MS));
    loop {
        match Arc::try_unwrap(shared) {
            Ok(value) => return Ok(value),
            Err(_) if Instant::now() >= deadline => {
                return Err(anyhow!("{what} is still referenced by a running thread"));
            }
            Err(still_shared) => {
                shared = still_shared;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

fn tcpip_thread<S: SysArch + 'static>(
    sys: &S,
    mbox: &S::Mailbox<Box<Msg<S>>>,
    core_lock: &S::Mutex,
    counters: &Counters,
    done: &S::Semaphore,
) {
    loop {
        match sys.mbox_fetch(mbox, IDLE_TIMEOUT_MS) {
            Ok((msg, _)) => match *msg {
                Msg::Packet(seq) => {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                    trace!("tcpip: packet {seq}");
                }
                Msg::Call { app, reply } => {
                    match sys.mutex_lock(core_lock) {
                        Ok(()) => {
                            counters.served.fetch_add(1, Ordering::Relaxed);
                            if let Err(err) = sys.mutex_unlock(core_lock) {
                                error!("tcpip: unlock failed: {err}");
                            }
                        }
                        Err(err) => error!("tcpip: lock failed: {err}"),
                    }
                    sys.sem_signal(&reply);
                    trace!("tcpip: served call from app {app}");
                }
                Msg::Shutdown => break,
            },
            Err(SysError::Timeout) => {
                counters.idle.fetch_add(1, Ordering::Relaxed);
                debug!("tcpip: idle for {IDLE_TIMEOUT_MS} ms");
            }
            Err(err) => {
                error!("tcpip: fetch failed: {err}");
                break;
            }
        }
    }
    sys.sem_signal(done);
}

/// Runs the loop to completion and frees everything it created.
pub fn run<S: SysArch + 'static>(sys: &Arc<S>, config: &LoopConfig) -> anyhow::Result<Report> {
    let started = sys.now_ms();
    let mbox = Arc::new(
        sys.mbox_new::<Box<Msg<S>>>(config.capacity)
            .context("creating the tcpip mailbox")?,
    );
    let core_lock = Arc::new(sys.mutex_new().context("creating the core lock")?);
    let tcpip_done = Arc::new(sys.sem_new_bounded(0, 1).context("creating the tcpip exit semaphore")?);
    let apps_done = Arc::new(sys.sem_new(0).context("creating the app exit semaphore")?);
    let counters = Arc::new(Counters::default());

    let tcpip = {
        let sys_ref = Arc::clone(sys);
        let mbox = Arc::clone(&mbox);
        let core_lock = Arc::clone(&core_lock);
        let counters = Arc::clone(&counters);
        let done = Arc::clone(&tcpip_done);
        sys.thread_new(
            "tcpip",
            move || tcpip_thread(&*sys_ref, &mbox, &core_lock, &counters, &done),
            config.stack_size,
            TCPIP_PRIORITY,
        )
        .context("starting the tcpip thread")?
    };

    let mut replies = Vec::with_capacity(config.apps);
    let mut apps = Vec::with_capacity(config.apps);
    for app in 0..config.apps {
        let reply = Arc::new(sys.sem_new_bounded(0, 1).context("creating a reply semaphore")?);
        replies.push(Arc::clone(&reply));

        let sys_ref = Arc::clone(sys);
        let mbox = Arc::clone(&mbox);
        let counters = Arc::clone(&counters);
        let done = Arc::clone(&apps_done);
        let calls = config.calls_per_app;
        let timeout_ms = config.call_timeout_ms;
        let client = move || {
            for call in 0..calls {
                let msg = Msg::Call {
                    app,
                    reply: Arc::clone(&reply),
                };
                sys_ref.mbox_post(&mbox, Box::new(msg));
                if let Err(err) = sys_ref.sem_wait(&reply, timeout_ms) {
                    warn!("app {app}: call {call} not answered: {err}");
                    counters.call_timeouts.fetch_add(1, Ordering::Relaxed);
                    // Consume the late answer so it cannot satisfy the next call.
                    if let Err(err) = sys_ref.sem_wait(&reply, JOIN_TIMEOUT_MS) {
                        error!("app {app}: call {call} never answered: {err}");
                        break;
                    }
                }
            }
            if sys_ref.sem_wait(&reply, 1).is_ok() {
                counters.stale_replies.fetch_add(1, Ordering::Relaxed);
            }
            sys_ref.sem_signal(&done);
        };
        apps.push(
            sys.thread_new("app", client, config.stack_size, APP_PRIORITY)
                .with_context(|| format!("starting app thread {app}"))?,
        );
    }

    let mut irq_yields = 0;
    for seq in 0..config.packets {
        let packet = Box::new(Msg::Packet(seq));
        if config.irq_every != 0 && seq % config.irq_every == 0 {
            let ((), yielded) = irq::raise(|| sys.mbox_post(&mbox, packet));
            irq_yields += usize::from(yielded);
        } else {
            sys.mbox_post(&mbox, packet);
        }
    }
    debug!("driver: {} packets handed to tcpip", config.packets);

    for _ in 0..config.apps {
        sys.sem_wait(&apps_done, JOIN_TIMEOUT_MS)
            .context("waiting for the app threads")?;
    }
    sys.mbox_post(&mbox, Box::new(Msg::Shutdown));
    sys.sem_wait(&tcpip_done, JOIN_TIMEOUT_MS)
        .context("waiting for the tcpip thread")?;
    drop(tcpip);
    drop(apps);

    let mbox = unshare(mbox, "tcpip mailbox")?;
    sys.mbox_free(mbox)
        .map_err(|busy| anyhow!("tcpip mailbox still holds {} message(s)", busy.pending))?;
    for reply in replies {
        sys.sem_free(unshare(reply, "reply semaphore")?);
    }
    sys.sem_free(unshare(apps_done, "app exit semaphore")?);
    sys.sem_free(unshare(tcpip_done, "tcpip exit semaphore")?);
    sys.mutex_free(unshare(core_lock, "core lock")?);

    let report = Report {
        packets_sent: config.packets,
        packets_received: counters.received.load(Ordering::Relaxed),
        irq_yields,
        calls_served: counters.served.load(Ordering::Relaxed),
        call_timeouts: counters.call_timeouts.load(Ordering::Relaxed),
        stale_replies: counters.stale_replies.load(Ordering::Relaxed),
        idle_wakeups: counters.idle.load(Ordering::Relaxed),
        elapsed_ms: sys.now_ms().wrapping_sub(started),
        stats: sys.stats(),
    };
    info!(
        "run finished: {} of {} packets, {} calls",
        report.packets_received, report.packets_sent, report.calls_served
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn task_context_run_delivers_everything() {
        init_logging();
        let sys = backend::build(1000);
        let config = LoopConfig {
            packets: 200,
            irq_every: 0,
            ..LoopConfig::default()
        };
        let report = run(&sys, &config).unwrap();

        assert_eq!(report.packets_received, 200);
        assert_eq!(report.calls_served, config.apps * config.calls_per_app);
        assert_eq!(report.call_timeouts, 0);
        assert_eq!(report.stale_replies, 0);
        assert_eq!(report.irq_yields, 0);
        assert_eq!(report.stats.mbox.used, 0);
        assert_eq!(report.stats.sem.used, 0);
        assert_eq!(report.stats.mutex.used, 0);
    }

    #[test]
    fn interrupt_posts_are_delivered_or_counted() {
        init_logging();
        let sys = backend::build(1000);
        let config = LoopConfig {
            packets: 300,
            apps: 1,
            calls_per_app: 10,
            capacity: 4,
            irq_every: 2,
            ..LoopConfig::default()
        };
        let report = run(&sys, &config).unwrap();

        assert_eq!(report.packets_dropped(), report.stats.mbox.err);
        assert_eq!(report.calls_served, 10);
        assert!(report.to_string().contains("api calls      10 served"));
    }

    #[test]
    fn late_answers_never_satisfy_a_later_call() {
        init_logging();
        let sys = backend::build(1000);
        let config = LoopConfig {
            packets: 2000,
            apps: 2,
            calls_per_app: 20,
            capacity: 64,
            irq_every: 0,
            call_timeout_ms: 1,
            ..LoopConfig::default()
        };
        let report = run(&sys, &config).unwrap();

        assert_eq!(report.calls_served, 40);
        assert_eq!(report.stale_replies, 0);
        assert_eq!(report.stats.sem.used, 0);
    }
}
