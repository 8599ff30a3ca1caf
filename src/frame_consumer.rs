// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Single worker draining the shared frame queue and invoking the
//! user-supplied analysis callback (spec §4.5).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::frame::Frame;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Analysis callback invoked for every dequeued frame. A no-op by default;
/// the real detection step is out of scope for this crate (spec §1).
pub type AnalysisCallback = Box<dyn Fn(&Frame) + Send + Sync>;

pub fn noop_callback() -> AnalysisCallback {
    Box::new(|_frame| {})
}

/// Run the consumer loop until `cancel` fires and the queue is drained.
pub async fn run(mut rx: mpsc::Receiver<Frame>, callback: AnalysisCallback, cancel: CancellationToken) {
    info!("frame consumer started");

    loop {
        let next = tokio::time::timeout(RECV_TIMEOUT, rx.recv()).await;
        match next {
            Ok(Some(frame)) => {
                debug!(camera = frame.camera_id, "dispatching frame to analysis callback");
                // A misbehaving callback must not kill this worker.
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&frame))) {
                    error!(camera = frame.camera_id, ?panic, "analysis callback panicked, swallowing");
                }
            }
            Ok(None) => {
                info!("frame queue closed, consumer exiting");
                break;
            }
            Err(_) => {
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }
}
