//! Timing helpers for integration tests
//!
//! - [`measure_sync`]: time a synchronous closure
//! - [`measure_async`]: time a future
//! - [`assert_duration_below`]: fail when an operation was too slow
//! - [`assert_duration_above`]: fail when an operation was suspiciously fast

use std::{
    future::Future,
    time::{Duration, Instant},
};

/// Runs `f` and returns its result with the elapsed time
///
/// # Example
///
/// ```
/// use capchain_test_utils::timing::measure_sync;
///
/// let (value, elapsed) = measure_sync("sum", || (1..=10).sum::<u32>());
/// assert_eq!(value, 55);
/// assert!(elapsed.as_secs() < 1);
/// ```
pub fn measure_sync<F, T>(name: &str, f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    println!("[TIMING] {}: {:.2}ms", name, elapsed.as_secs_f64() * 1000.0);
    (result, elapsed)
}

/// Awaits `future` and returns its output with the elapsed time
pub async fn measure_async<F, T>(name: &str, future: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = future.await;
    let elapsed = start.elapsed();
    println!("[TIMING] {}: {:.2}ms", name, elapsed.as_secs_f64() * 1000.0);
    (result, elapsed)
}

/// Asserts that `actual` does not exceed `threshold`
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use capchain_test_utils::timing::assert_duration_below;
///
/// assert_duration_below(Duration::from_millis(500), Duration::from_secs(1), "capture");
/// ```
///
/// # Panics
///
/// Panics if `actual > threshold`, reporting by how much.
pub fn assert_duration_below(actual: Duration, threshold: Duration, operation: &str) {
    assert!(
        actual <= threshold,
        "{} took {:.3}s, expected <={:.3}s ({}ms over threshold)",
        operation,
        actual.as_secs_f64(),
        threshold.as_secs_f64(),
        (actual.as_millis() as i128) - (threshold.as_millis() as i128)
    );
}

/// Asserts that `actual` is at least `minimum`
///
/// Catches timeouts that fired early or waits that were skipped.
///
/// # Panics
///
/// Panics if `actual < minimum`.
pub fn assert_duration_above(actual: Duration, minimum: Duration, operation: &str) {
    assert!(
        actual >= minimum,
        "{} took {:.3}s, expected >={:.3}s (suspiciously fast)",
        operation,
        actual.as_secs_f64(),
        minimum.as_secs_f64()
    );
}
