//! Wall-clock time.
//!
//! Scheduling inside the engine uses `tokio::time::Instant` (monotonic and
//! pausable in tests); wall-clock milliseconds are only needed for signed
//! exchange requests and numeric client ids.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
