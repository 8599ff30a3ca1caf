// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Spawn/wait/terminate wrapper around the external media tool (spec §4.1).
//!
//! Built on `tokio::process` so readers of stdout/stderr are plain async
//! tasks rather than dedicated OS threads. `terminate()` sends a polite
//! `SIGTERM` and falls back to a hard kill if the process doesn't exit
//! within `graceful_timeout`; it is safe to call more than once.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{info, warn};

use crate::error::{Result, SupervisorError};

/// A spawned media-tool process with its pipes detached for exclusive
/// ownership by the reader workers.
pub struct ChildProcess {
    child: Child,
    camera_id: String,
    graceful_timeout: Duration,
    terminated: bool,
}

impl ChildProcess {
    /// Spawn `program` with `args`, piping stdout and stderr.
    pub fn spawn(
        camera_id: &str,
        program: &str,
        args: &[String],
        graceful_timeout: Duration,
    ) -> Result<Self> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Spawn { id: camera_id.to_string(), reason: e.to_string() })?;

        Ok(Self { child, camera_id: camera_id.to_string(), graceful_timeout, terminated: false })
    }

    /// Take ownership of the stdout pipe. Panics if called twice (the
    /// contract guarantees each stream has exactly one reader).
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr pipe. Panics if called twice.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Send a polite stop, escalate to a hard kill after `graceful_timeout`,
    /// then reap the process. Idempotent — calling this twice is a no-op on
    /// the second call beyond re-awaiting the already-reaped status.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        if !self.terminated {
            self.terminated = true;
            self.send_graceful_stop().await;

            match tokio::time::timeout(self.graceful_timeout, self.child.wait()).await {
                Ok(Ok(status)) => return Ok(status),
                Ok(Err(e)) => return Err(SupervisorError::Io(e)),
                Err(_) => {
                    warn!(camera = self.camera_id, "Graceful stop timed out, killing");
                }
            }

            if let Err(e) = self.child.start_kill() {
                warn!(camera = self.camera_id, error = %e, "Hard kill failed (process likely already gone)");
            }
        }

        self.wait().await
    }

    /// Block until the process exits. May be called multiple times after
    /// the first return — `tokio::process::Child::wait` itself is
    /// idempotent once the status has been reaped.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(SupervisorError::Io)
    }

    #[cfg(unix)]
    async fn send_graceful_stop(&self) {
        let Some(pid) = self.child.id() else { return };
        let status = Command::new("kill").arg("-TERM").arg(pid.to_string()).status().await;
        match status {
            Ok(s) if s.success() => info!(camera = self.camera_id, pid, "Sent SIGTERM"),
            Ok(s) => warn!(camera = self.camera_id, pid, code = ?s.code(), "kill -TERM exited non-zero"),
            Err(e) => warn!(camera = self.camera_id, pid, error = %e, "Failed to invoke kill -TERM"),
        }
    }

    #[cfg(not(unix))]
    async fn send_graceful_stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(camera = self.camera_id, error = %e, "Failed to request process termination");
        }
    }
}
