// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Consumes hand-off messages, relocates closed segments into the
//! date/camera-organized archive, and triggers eviction (spec §4.7).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::segment_tracker::HandOff;
use crate::space_enforcer::SpaceEnforcer;

fn segment_filename_pattern() -> Regex {
    Regex::new(r"^([^_]+)_(\d{4})_(\d{2})_(\d{2})_(\d{2})_(\d{2})_(\d{2})\.mp4$").expect("valid regex")
}

/// Parsed components of a segment filename, per the naming contract.
struct ParsedSegment {
    camera_id: String,
    year: String,
    month: String,
    day: String,
}

fn parse_segment_filename(filename: &str, pattern: &Regex) -> Option<ParsedSegment> {
    let caps = pattern.captures(filename)?;
    Some(ParsedSegment {
        camera_id: caps[1].to_string(),
        year: caps[2].to_string(),
        month: caps[3].to_string(),
        day: caps[4].to_string(),
    })
}

/// Compute the archive destination for a scratch segment path. Returns
/// `None` if the filename does not match the segment naming contract.
pub fn archive_destination(archive_dir: &Path, scratch_path: &Path) -> Option<PathBuf> {
    let filename = scratch_path.file_name()?.to_str()?;
    let parsed = parse_segment_filename(filename, &segment_filename_pattern())?;
    Some(
        archive_dir
            .join(format!("{}_{}_{}", parsed.year, parsed.month, parsed.day))
            .join(parsed.camera_id)
            .join(filename),
    )
}

/// Move one segment from scratch into the archive. Logs and returns `Ok(())`
/// on a filename mismatch or I/O failure — a single bad file must never
/// halt the mover (spec §4.7 error policy).
async fn move_one(archive_dir: &Path, handoff: &HandOff) {
    let Some(target) = archive_destination(archive_dir, &handoff.scratch_path) else {
        error!(
            camera = handoff.camera_id,
            path = ?handoff.scratch_path,
            "could not parse segment filename, leaving in scratch"
        );
        return;
    };

    let Some(parent) = target.parent() else { return };
    if let Err(e) = tokio::fs::create_dir_all(parent).await {
        error!(camera = handoff.camera_id, dir = ?parent, error = %e, "could not create archive directory");
        return;
    }

    match tokio::fs::rename(&handoff.scratch_path, &target).await {
        Ok(()) => {
            info!(camera = handoff.camera_id, from = ?handoff.scratch_path, to = ?target, "segment archived");
        }
        // EXDEV: source and destination are on different filesystems. The
        // core requires scratch and archive to share one filesystem so an
        // atomic rename always suffices; treat this as an invariant
        // violation rather than silently falling back to copy+unlink.
        Err(e) if e.raw_os_error() == Some(18) => {
            let err = crate::error::SupervisorError::InvariantViolation {
                path: handoff.scratch_path.to_string_lossy().into_owned(),
                reason: "cross-filesystem rename not supported, segment remains in scratch".to_string(),
            };
            error!(camera = handoff.camera_id, %err);
        }
        Err(e) => {
            warn!(camera = handoff.camera_id, path = ?handoff.scratch_path, error = %e, "failed to move segment");
        }
    }
}

/// Drain hand-off messages until the channel closes, moving each segment
/// and triggering the space enforcer after every successful pass.
pub async fn run(
    mut rx: mpsc::UnboundedReceiver<HandOff>,
    archive_dir: PathBuf,
    enforcer: Arc<SpaceEnforcer>,
) {
    info!("file mover started");
    while let Some(handoff) = rx.recv().await {
        move_one(&archive_dir, &handoff).await;
        enforcer.ensure().await;
    }
    info!("hand-off channel closed, file mover exiting");
}

/// Recover segments left behind by an unclean prior shutdown: enumerate
/// `scratch_dir` and enqueue every file matching the naming contract as if
/// the tracker had just closed it (spec §4.7 leftover sweep).
pub async fn leftover_sweep(scratch_dir: &Path, handoff_tx: &mpsc::UnboundedSender<HandOff>) {
    let pattern = segment_filename_pattern();
    let mut entries = match tokio::fs::read_dir(scratch_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = ?scratch_dir, error = %e, "could not scan scratch dir for leftovers");
            return;
        }
    };

    let mut swept = 0usize;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "error walking scratch dir");
                break;
            }
        };
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let Some(parsed) = parse_segment_filename(filename, &pattern) else { continue };

        swept += 1;
        let _ = handoff_tx.send(HandOff { camera_id: parsed.camera_id, scratch_path: path });
    }

    if swept > 0 {
        info!(count = swept, "requeued leftover scratch segments from a prior run");
    }
}
