use crate::time::{
    elapsed_ticks, ms_to_ticks, normalize_elapsed, now_ms, ticks_to_ms, ManualTicks, Stopwatch,
    TickSource, MAX_ELAPSED_MS, MAX_TIMEOUT_TICKS, TICK_PERIOD,
};

#[test]
fn elapsed_without_wrap() {
    assert_eq!(elapsed_ticks(100, 350, TICK_PERIOD), 250);
    assert_eq!(elapsed_ticks(7, 7, TICK_PERIOD), 0);
}

#[test]
fn elapsed_across_wrap_matches_unwrapped_difference() {
    let start = u32::MAX - 9;
    let end = 15;
    assert_eq!(elapsed_ticks(start, end, TICK_PERIOD), 25);
    assert_eq!(u64::from(end.wrapping_sub(start)), 25);
}

#[test]
fn elapsed_with_short_period_counter() {
    // 16-bit counter: modulus 65536.
    assert_eq!(elapsed_ticks(65_530, 4, 1 << 16), 10);
}

#[test]
fn ticks_to_ms_uses_rate() {
    assert_eq!(ticks_to_ms(250, 1000), 250);
    assert_eq!(ticks_to_ms(25, 100), 250);
    assert_eq!(ticks_to_ms(3, 1024), 2);
}

#[test]
fn ticks_to_ms_saturates() {
    assert_eq!(ticks_to_ms(u64::MAX, 1), MAX_ELAPSED_MS);
    assert_eq!(ticks_to_ms(u64::from(u32::MAX), 1), MAX_ELAPSED_MS);
}

#[test]
fn ms_to_ticks_never_rounds_a_delay_to_zero() {
    assert_eq!(ms_to_ticks(0, 100), 0);
    assert_eq!(ms_to_ticks(1, 100), 1);
    assert_eq!(ms_to_ticks(9, 100), 1);
    assert_eq!(ms_to_ticks(50, 100), 5);
    assert_eq!(ms_to_ticks(50, 1000), 50);
}

#[test]
fn ms_to_ticks_rounds_partial_ticks_up() {
    assert_eq!(ms_to_ticks(15, 100), 2);
    assert_eq!(ms_to_ticks(11, 100), 2);
    assert_eq!(ms_to_ticks(20, 100), 2);
    assert_eq!(ms_to_ticks(3, 1024), 4);
    assert!(ticks_to_ms(u64::from(ms_to_ticks(15, 100)), 100) >= 15);
}

#[test]
fn ms_to_ticks_keeps_forever_sentinel_free() {
    assert_eq!(ms_to_ticks(u32::MAX, 10_000), MAX_TIMEOUT_TICKS);
}

#[test]
fn zero_elapsed_reports_one_ms() {
    assert_eq!(normalize_elapsed(0), 1);
    assert_eq!(normalize_elapsed(42), 42);
}

#[test]
fn stopwatch_across_wrap() {
    let clock = ManualTicks::starting_at(u32::MAX - 4, 1000);
    let watch = Stopwatch::start(&clock);
    clock.advance(30);
    assert_eq!(clock.now(), 25);
    assert_eq!(watch.elapsed_ticks(&clock), 30);
    assert_eq!(watch.elapsed_ms(&clock), 30);
}

#[test]
fn stopwatch_reports_at_least_one_ms() {
    let clock = ManualTicks::new(100);
    let watch = Stopwatch::start(&clock);
    assert_eq!(watch.elapsed_ms(&clock), 1);
}

#[test]
fn now_ms_scales_ticks() {
    let clock = ManualTicks::starting_at(250, 100);
    assert_eq!(now_ms(&clock), 2500);
}

#[cfg(feature = "std")]
#[test]
fn monotonic_ticks_wrap_from_offset() {
    use crate::time::MonotonicTicks;

    let clock = MonotonicTicks::with_offset(u32::MAX - 1, 1000);
    let watch = Stopwatch::start(&clock);
    std::thread::sleep(std::time::Duration::from_millis(10));
    let ticks = watch.elapsed_ticks(&clock);
    assert!((10..1000).contains(&ticks), "elapsed {ticks}");
    assert!(clock.now() < 1000);
}
