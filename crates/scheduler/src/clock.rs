//! Monotonic millisecond ticks.
//!
//! Every time-dependent decision in the core takes an optional tick so tests
//! can drive the clock explicitly; `None` means "now".

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since the first call in this process.
pub fn tick_now() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}

/// Resolve an optional caller-supplied tick.
pub fn resolve(timestamp: Option<u64>) -> u64 {
    timestamp.unwrap_or_else(tick_now)
}
