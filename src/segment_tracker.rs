// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Parses the media tool's stderr, recognizes segment rollover, and
//! publishes hand-off messages for the closed segment (spec §4.3).

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::log_ring::LogRing;

/// One closed segment, ready to be handed off to the mover.
#[derive(Debug, Clone)]
pub struct HandOff {
    pub camera_id: String,
    pub scratch_path: PathBuf,
}

fn segment_open_pattern() -> Regex {
    Regex::new(r"\[segment @ [^\]]+\] Opening '([^']+)' for writing").expect("valid regex")
}

const NOISE_SUBSTRINGS: [&str; 3] = ["size=", "time=", "bitrate="];

fn is_progress_noise(line: &str) -> bool {
    NOISE_SUBSTRINGS.iter().any(|s| line.contains(s))
}

/// Track the media tool's stderr for one camera, reading line by line until
/// EOF or cancellation.
///
/// Returns the path of the segment that was still open (the "current" one)
/// when the stream ended, if any — the caller (`CameraPipeline`) decides
/// whether it's safe to hand that final segment off too.
pub async fn run<R>(
    camera_id: String,
    stderr: R,
    ring: Arc<LogRing>,
    handoff_tx: mpsc::UnboundedSender<HandOff>,
    cancel: CancellationToken,
) -> Option<PathBuf>
where
    R: AsyncRead + Unpin,
{
    let pattern = segment_open_pattern();
    let mut lines = BufReader::new(stderr).lines();
    let mut current: Option<PathBuf> = None;

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(camera = camera_id, "stderr stream ended");
                break;
            }
            Err(e) => {
                warn!(camera = camera_id, error = %e, "error reading stderr");
                break;
            }
        };

        if is_progress_noise(&line) {
            continue;
        }
        ring.append(line.clone());

        if let Some(caps) = pattern.captures(&line) {
            let new_path = PathBuf::from(&caps[1]);
            if let Some(prev) = current.take() {
                if prev != new_path {
                    debug!(camera = camera_id, path = ?prev, "segment closed, publishing hand-off");
                    let _ = handoff_tx.send(HandOff { camera_id: camera_id.clone(), scratch_path: prev });
                } else {
                    // Identical path reopened — keep tracking it as current,
                    // do not re-publish.
                }
            }
            current = Some(new_path);
        }
    }

    current
}
