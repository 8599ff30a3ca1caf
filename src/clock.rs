// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Wall-clock and monotonic time sources, abstracted behind a trait so
//! segment-rollover and frame-timestamping logic can be exercised in tests
//! without waiting on real timers.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock and monotonic readings.
///
/// The default [`SystemClock`] wraps `chrono::Utc::now()` and
/// `tokio::time::Instant::now()`. Tests may supply a fixed or
/// manually-advanced implementation.
pub trait ClockSource: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
    fn now_monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}
