//! Wall-clock timing for pipeline stages.
//!
//! Both helpers run the wrapped operation exactly once, report the elapsed
//! time as a single `tracing` event and hand back the operation's own output.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

/// Await `fut` once and report how long it took.
pub async fn timed<F, T>(label: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    report(label, start.elapsed());
    output
}

/// Call `f` once and report how long it took.
pub fn timed_blocking<F, T>(label: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let output = f();
    report(label, start.elapsed());
    output
}

fn report(label: &str, elapsed: Duration) {
    info!(
        operation = label,
        elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
        "Time taken: {:.6}s",
        elapsed.as_secs_f64()
    );
}
