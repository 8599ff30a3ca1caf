// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Fixed-size raw-frame reader with bounded-wait drop policy (spec §4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::ClockSource;

pub const FRAME_WIDTH: usize = 640;
pub const FRAME_HEIGHT: usize = 480;
pub const FRAME_CHANNELS: usize = 3;
pub const FRAME_BYTES: usize = FRAME_WIDTH * FRAME_HEIGHT * FRAME_CHANNELS;

/// One decoded 640x480 RGB frame from a single camera.
#[derive(Clone)]
pub struct Frame {
    pub camera_id: String,
    /// Row-major, 480 rows x 640 columns x 3 channels, RGB order.
    pub data: Arc<[u8]>,
    pub arrived_at: tokio::time::Instant,
}

/// Per-camera counter of frames dropped due to a full queue.
#[derive(Default)]
pub struct DropCounter(AtomicU64);

impl DropCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Read fixed-size frame records from the media tool's stdout and offer
/// them to the shared frame queue, dropping on a bounded-wait timeout.
pub async fn run<R>(
    camera_id: String,
    mut stdout: R,
    tx: mpsc::Sender<Frame>,
    drops: Arc<DropCounter>,
    offer_timeout: Duration,
    clock: Arc<dyn ClockSource>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; FRAME_BYTES];

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let read_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = read_full_record(&mut stdout, &mut buf) => result,
        };

        let complete = match read_result {
            Ok(true) => true,
            Ok(false) => {
                info!(camera = camera_id, "frame stream ended cleanly");
                break;
            }
            Err(n) => {
                warn!(camera = camera_id, bytes = n, expected = FRAME_BYTES, "short read on frame stream");
                break;
            }
        };
        if !complete {
            break;
        }

        let frame = Frame {
            camera_id: camera_id.clone(),
            data: Arc::from(buf.as_slice()),
            arrived_at: clock.now_monotonic(),
        };

        match tokio::time::timeout(offer_timeout, tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                info!(camera = camera_id, "frame queue closed, stopping reader");
                break;
            }
            Err(_) => {
                drops.increment();
            }
        }
    }
}

/// Read exactly `buf.len()` bytes. Returns:
///   `Ok(true)`  — full record read.
///   `Ok(false)` — stream ended with 0 bytes read (clean EOF).
///   `Err(n)`    — stream ended after `n` (0 < n < buf.len()) bytes: a short read.
async fn read_full_record<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool, usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await.unwrap_or(0);
        if n == 0 {
            return if filled == 0 { Ok(false) } else { Err(filled) };
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    /// Reports a fixed monotonic reading regardless of when it's called,
    /// so a test can assert a `Frame` carries the injected time rather than
    /// whatever the real clock happened to read during the run.
    struct FakeClock(tokio::time::Instant);

    impl ClockSource for FakeClock {
        fn now_utc(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }

        fn now_monotonic(&self) -> tokio::time::Instant {
            self.0
        }
    }

    fn system_clock() -> Arc<dyn ClockSource> {
        Arc::new(SystemClock)
    }

    #[tokio::test]
    async fn clean_eof_with_no_bytes_ends_without_drop() {
        let cursor = std::io::Cursor::new(Vec::<u8>::new());
        let (tx, mut rx) = mpsc::channel(4);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();

        run("cam1".into(), cursor, tx, drops.clone(), Duration::from_millis(50), system_clock(), cancel).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(drops.get(), 0);
    }

    #[tokio::test]
    async fn short_read_logs_and_exits_without_emitting_frame() {
        let cursor = std::io::Cursor::new(vec![1u8; FRAME_BYTES - 10]);
        let (tx, mut rx) = mpsc::channel(4);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();

        run("cam1".into(), cursor, tx, drops.clone(), Duration::from_millis(50), system_clock(), cancel).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn one_full_record_is_enqueued() {
        let cursor = std::io::Cursor::new(vec![7u8; FRAME_BYTES]);
        let (tx, mut rx) = mpsc::channel(4);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();

        run("cam1".into(), cursor, tx, drops.clone(), Duration::from_millis(50), system_clock(), cancel).await;

        let frame = rx.try_recv().expect("one frame");
        assert_eq!(frame.camera_id, "cam1");
        assert_eq!(frame.data.len(), FRAME_BYTES);
        assert_eq!(drops.get(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_after_timeout_and_continues() {
        let two_frames = vec![9u8; FRAME_BYTES * 2];
        let cursor = std::io::Cursor::new(two_frames);
        // Capacity 1, and we never drain — the second offer must time out and drop.
        let (tx, mut rx) = mpsc::channel(1);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();

        run("cam1".into(), cursor, tx, drops.clone(), Duration::from_millis(20), system_clock(), cancel).await;

        assert!(rx.try_recv().is_ok(), "first frame should have been enqueued");
        assert_eq!(drops.get(), 1, "second frame should have been dropped, not blocked forever");
    }

    #[tokio::test]
    async fn cancellation_stops_reader_promptly() {
        let (_write, read) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(4);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            Duration::from_millis(200),
            run("cam1".into(), read, tx, drops, Duration::from_millis(500), system_clock(), cancel),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn arrived_at_comes_from_the_injected_clock_not_real_time() {
        let fixed = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let cursor = std::io::Cursor::new(vec![3u8; FRAME_BYTES]);
        let (tx, mut rx) = mpsc::channel(4);
        let drops = Arc::new(DropCounter::new());
        let cancel = CancellationToken::new();

        run(
            "cam1".into(),
            cursor,
            tx,
            drops,
            Duration::from_millis(50),
            Arc::new(FakeClock(fixed)),
            cancel,
        )
        .await;

        let frame = rx.try_recv().expect("one frame");
        assert_eq!(frame.arrived_at, fixed, "reader must consult the injected clock, not Instant::now()");
    }
}
