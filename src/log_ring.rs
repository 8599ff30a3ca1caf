// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Fixed-capacity ring buffer of textual log lines, one per camera.
//!
//! `append` and `snapshot` may run concurrently from any thread; both take
//! the same internal lock, so a snapshot always observes a consistent
//! prefix of what's been appended — never a torn entry.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Thread-safe ring buffer holding the most recent `capacity` lines.
pub struct LogRing {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), lines: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Append one line, overwriting the oldest entry once at capacity.
    pub fn append(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Return the lines currently held, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Snapshot joined with newlines, convenient for the HTTP log-tail route.
    pub fn snapshot_text(&self) -> String {
        self.snapshot().join("\n")
    }
}
