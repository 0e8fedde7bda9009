//! MOOS time and the process-wide time-warp factor.
//!
//! Brokers may run with an accelerated clock ("time warp"). The warp factor
//! is negotiated once during the handshake and from then on scales every
//! locally generated timestamp. It is process-wide state: one factor shared
//! by every client in the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bit pattern of `1.0f64`, the default (unwarped) factor.
const DEFAULT_WARP_BITS: u64 = 0x3FF0_0000_0000_0000;

/// A Welcome timestamp further than this from local time triggers warp
/// detection.
pub const WARP_DETECT_THRESHOLD: f64 = 10_000.0;

static TIME_WARP: AtomicU64 = AtomicU64::new(DEFAULT_WARP_BITS);

/// Get the current process-wide time-warp factor.
#[inline]
pub fn time_warp() -> f64 {
    f64::from_bits(TIME_WARP.load(Ordering::Acquire))
}

/// Set the process-wide time-warp factor.
///
/// Called during handshake when warp is detected; rarely useful otherwise.
pub fn set_time_warp(warp: f64) {
    TIME_WARP.store(warp.to_bits(), Ordering::Release);
}

/// Current MOOS time: UNIX time in seconds scaled by the warp factor.
pub fn moos_time() -> f64 {
    unix_time() * time_warp()
}

/// Wall-clock UNIX time in seconds, unwarped.
fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Derive a warp factor from a broker timestamp and the local clock.
///
/// Returns `Some(warp)` rounded to two decimal places when the two clocks
/// differ by more than [`WARP_DETECT_THRESHOLD`], `None` when they agree
/// within tolerance.
pub fn compute_warp(remote: f64, local: f64) -> Option<f64> {
    if local == 0.0 {
        return None;
    }
    if (remote - local).abs() > WARP_DETECT_THRESHOLD {
        Some(((remote / local) * 100.0).round() / 100.0)
    } else {
        None
    }
}
