// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Size-bounded eviction of the oldest archived files, and pruning of
//! directories left empty by eviction (spec §4.8).

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Enforces `max_occupied_mib` over `archive_dir`. Runs after every mover
/// pass and on a periodic ticker; the internal lock keeps the two callers
/// from walking/deleting the tree concurrently (spec §5 shared-resource
/// discipline).
pub struct SpaceEnforcer {
    archive_dir: PathBuf,
    max_occupied_mib: u64,
    lock: Mutex<()>,
}

struct FileEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl SpaceEnforcer {
    pub fn new(archive_dir: PathBuf, max_occupied_mib: u64) -> Self {
        Self { archive_dir, max_occupied_mib, lock: Mutex::new(()) }
    }

    /// Evict oldest-first until the archive is within budget, then prune
    /// empty directories. A no-op when eviction is disabled (`max_occupied_mib
    /// == 0`) or the archive does not yet exist.
    pub async fn ensure(&self) {
        if self.max_occupied_mib == 0 {
            return;
        }
        if tokio::fs::metadata(&self.archive_dir).await.is_err() {
            return;
        }

        let _guard = self.lock.lock().await;
        let limit_bytes = self.max_occupied_mib * 1_048_576;

        let mut files = match walk_files(&self.archive_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = ?self.archive_dir, error = %e, "failed to walk archive for size accounting");
                return;
            }
        };

        let mut current_bytes: u64 = files.iter().map(|f| f.size).sum();
        if current_bytes <= limit_bytes {
            return;
        }

        // Oldest first; break ties by path for determinism.
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        let total_files = files.len();
        for (idx, file) in files.iter().enumerate() {
            if current_bytes <= limit_bytes {
                break;
            }
            // Never shrink below a single remaining file.
            if total_files - idx <= 1 {
                break;
            }
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    current_bytes = current_bytes.saturating_sub(file.size);
                    info!(path = ?file.path, size = file.size, "evicted archived file over budget");
                }
                Err(e) => {
                    warn!(path = ?file.path, error = %e, "failed to evict archived file");
                }
            }
        }

        prune_empty_dirs(&self.archive_dir).await;
    }

    /// Run `ensure()` on `interval` until `cancel` fires.
    pub async fn run_periodic(self: std::sync::Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.ensure().await,
            }
        }
    }
}

async fn walk_files(root: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut stack = vec![root.to_path_buf()];
    let mut out = Vec::new();

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "failed to read archive subdirectory, skipping");
                continue;
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = ?path, error = %e, "failed to stat archive entry, skipping");
                    continue;
                }
            };
            if meta.is_dir() {
                stack.push(path);
            } else if meta.is_file() {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                out.push(FileEntry { path, size: meta.len(), modified });
            }
        }
    }

    Ok(out)
}

/// Remove every directory under `root` that is now empty, bottom-up,
/// except `root` itself.
async fn prune_empty_dirs(root: &Path) {
    let mut dirs = Vec::new();
    collect_dirs(root, &mut dirs).await;
    // Deepest first so a parent becomes a removal candidate only after its
    // children have already been judged/removed.
    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

    for dir in dirs {
        if dir == root {
            continue;
        }
        let is_empty = match tokio::fs::read_dir(&dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(_) => false,
        };
        if is_empty {
            if let Err(e) = tokio::fs::remove_dir(&dir).await {
                warn!(dir = ?dir, error = %e, "failed to remove empty archive directory");
            }
        }
    }
}

async fn collect_dirs(root: &Path, out: &mut Vec<PathBuf>) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        out.push(dir.clone());
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(meta) = entry.metadata().await {
                if meta.is_dir() {
                    stack.push(entry.path());
                }
            }
        }
    }
}
