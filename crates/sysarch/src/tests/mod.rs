mod context;
mod mail;
mod pool;
mod time;

#[cfg(feature = "std")]
mod host;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
