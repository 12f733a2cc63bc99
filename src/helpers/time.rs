use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::time::Instant;

/// Monotonic start point for duration metrics; follows the tokio clock.
pub fn get_instant() -> Instant {
    Instant::now()
}

/// Seconds elapsed since `start`, as prometheus histograms expect.
pub fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

/// Wall-clock time one `interval` from now, RFC 3339 UTC.
pub fn next_tick_rfc3339(interval: Duration) -> String {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| Utc::now().checked_add_signed(interval))
        .map(|next| next.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
