// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

/// Error taxonomy for the capture supervisor (see §7 of the design doc).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Invalid or missing configuration. Fatal before startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The media tool child process failed to start. The owning pipeline
    /// transitions to `Failed`; other cameras are unaffected.
    #[error("Camera '{id}' failed to spawn: {reason}")]
    Spawn { id: String, reason: String },

    /// A single scratch-move or archive-delete failed. Logged and skipped,
    /// never fatal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Short read on stdout, or the child process exited. Not fatal to the
    /// supervisor.
    #[error("Camera '{id}' stream error: {reason}")]
    Stream { id: String, reason: String },

    /// A file violated an invariant the mover relies on (e.g. cross-filesystem
    /// rename). Logged for that single file; it remains in scratch.
    #[error("Invariant violated for '{path}': {reason}")]
    InvariantViolation { path: String, reason: String },

    /// Requested camera is not known to the supervisor (log-tail / status API).
    #[error("Camera '{id}' not found")]
    CameraNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
