// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! One recording pipeline per camera: owns the child process, its stderr
//! tracker and optional frame reader, and drives startup/teardown (spec
//! §4.6).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::child_process::ChildProcess;
use crate::clock::{ClockSource, SystemClock};
use crate::config::CameraSpec;
use crate::error::Result;
use crate::frame::{self, DropCounter};
use crate::log_ring::LogRing;
use crate::segment_tracker::{self, HandOff};

/// Current lifecycle stage of a [`CameraPipeline`] (spec §3 `PipelineState`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Draining,
    Stopped,
    Failed { reason: String },
}

/// On-demand snapshot for the status endpoint / log-tail, never persisted.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub cam_id: String,
    pub state: PipelineState,
    pub frames_dropped: u64,
    pub last_segment_archived: Option<PathBuf>,
}

/// Builds the argument vector documented in spec §4.1 for one camera.
pub fn build_args(camera: &CameraSpec, scratch_dir: &std::path::Path) -> Vec<String> {
    let segment_secs = camera.segment_duration.as_secs().max(1);
    let pattern = scratch_dir.join(format!("{}_%Y_%m_%d_%H_%M_%S.mp4", camera.id));

    let mut args = vec![
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-i".to_string(),
        camera.url.clone(),
        "-an".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-strftime".to_string(),
        "1".to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-segment_time".to_string(),
        segment_secs.to_string(),
        pattern.to_string_lossy().into_owned(),
    ];

    if camera.detection_interval > 0 {
        args.extend([
            "-vf".to_string(),
            format!(
                "select=not(mod(n\\,{})),scale=640:480",
                camera.detection_interval
            ),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "pipe:1".to_string(),
        ]);
    }

    args
}

/// Handles shared with the reader workers; keeps the pipeline object from
/// being referenced cyclically (spec §9 ownership note).
struct WorkerHandles {
    cancel: CancellationToken,
    segment_tracker: Option<JoinHandle<Option<PathBuf>>>,
    frame_reader: Option<JoinHandle<()>>,
}

/// Owns one camera's child process and reader workers for the supervisor's
/// lifetime.
pub struct CameraPipeline {
    cam_id: String,
    camera: CameraSpec,
    scratch_dir: PathBuf,
    media_tool: String,
    graceful_timeout: Duration,
    reader_join_timeout: Duration,
    ring: Arc<LogRing>,
    drops: Arc<DropCounter>,
    clock: Arc<dyn ClockSource>,
    state: Arc<RwLock<PipelineState>>,
    last_archived: Arc<RwLock<Option<PathBuf>>>,
    child: Option<ChildProcess>,
    workers: Option<WorkerHandles>,
}

impl CameraPipeline {
    pub fn new(
        camera: CameraSpec,
        scratch_dir: PathBuf,
        media_tool: String,
        graceful_timeout: Duration,
        reader_join_timeout: Duration,
        log_ring_capacity: usize,
    ) -> Self {
        Self {
            cam_id: camera.id.clone(),
            camera,
            scratch_dir,
            media_tool,
            graceful_timeout,
            reader_join_timeout,
            ring: Arc::new(LogRing::new(log_ring_capacity)),
            drops: Arc::new(DropCounter::new()),
            clock: Arc::new(SystemClock),
            state: Arc::new(RwLock::new(PipelineState::Starting)),
            last_archived: Arc::new(RwLock::new(None)),
            child: None,
            workers: None,
        }
    }

    pub fn cam_id(&self) -> &str {
        &self.cam_id
    }

    pub fn logs(&self) -> Arc<LogRing> {
        self.ring.clone()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            cam_id: self.cam_id.clone(),
            state: self.state.read().clone(),
            frames_dropped: self.drops.get(),
            last_segment_archived: self.last_archived.read().clone(),
        }
    }

    /// Spawn the child process and reader workers, transitioning to
    /// `Running` on success or `Failed` on spawn error.
    pub async fn start(
        &mut self,
        handoff_tx: mpsc::UnboundedSender<HandOff>,
        frame_tx: mpsc::Sender<frame::Frame>,
        frame_offer_timeout: Duration,
    ) -> Result<()> {
        if let Err(e) = tokio::fs::create_dir_all(&self.scratch_dir).await {
            let reason = format!("cannot create scratch dir {:?}: {e}", self.scratch_dir);
            *self.state.write() = PipelineState::Failed { reason: reason.clone() };
            return Err(crate::error::SupervisorError::Spawn { id: self.cam_id.clone(), reason });
        }

        let args = build_args(&self.camera, &self.scratch_dir);
        let mut child = match ChildProcess::spawn(&self.cam_id, &self.media_tool, &args, self.graceful_timeout) {
            Ok(child) => child,
            Err(e) => {
                *self.state.write() = PipelineState::Failed { reason: e.to_string() };
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();

        let stderr = child.take_stderr().expect("stderr piped at spawn");
        let tracker_handle = tokio::spawn(segment_tracker::run(
            self.cam_id.clone(),
            stderr,
            self.ring.clone(),
            handoff_tx,
            cancel.clone(),
        ));

        let frame_reader_handle = if self.camera.detection_interval > 0 {
            let stdout = child.take_stdout().expect("stdout piped at spawn");
            Some(tokio::spawn(frame::run(
                self.cam_id.clone(),
                stdout,
                frame_tx,
                self.drops.clone(),
                frame_offer_timeout,
                self.clock.clone(),
                cancel.clone(),
            )))
        } else {
            None
        };

        self.child = Some(child);
        self.workers = Some(WorkerHandles {
            cancel,
            segment_tracker: Some(tracker_handle),
            frame_reader: frame_reader_handle,
        });
        *self.state.write() = PipelineState::Running;
        info!(camera = self.cam_id, "pipeline running");
        Ok(())
    }

    /// Tear the pipeline down: cancel readers, terminate the child, join
    /// readers with a bound, and hand off the final segment if the exit was
    /// clean. Safe to call more than once — the second call observes no
    /// workers/child and is a no-op.
    pub async fn teardown(&mut self, handoff_tx: &mpsc::UnboundedSender<HandOff>) {
        if matches!(*self.state.read(), PipelineState::Stopped) {
            return;
        }
        *self.state.write() = PipelineState::Draining;

        let Some(mut workers) = self.workers.take() else {
            *self.state.write() = PipelineState::Stopped;
            return;
        };
        workers.cancel.cancel();

        let mut clean_exit = false;
        if let Some(mut child) = self.child.take() {
            match child.terminate().await {
                Ok(status) => clean_exit = status.success(),
                Err(e) => warn!(camera = self.cam_id, error = %e, "error terminating child"),
            }
        }

        let mut current_segment = None;
        if let Some(handle) = workers.segment_tracker.take() {
            match tokio::time::timeout(self.reader_join_timeout, handle).await {
                Ok(Ok(path)) => current_segment = path,
                Ok(Err(e)) => error!(camera = self.cam_id, error = %e, "segment tracker task panicked"),
                Err(_) => warn!(camera = self.cam_id, "segment tracker did not join in time"),
            }
        }
        if let Some(handle) = workers.frame_reader.take() {
            if let Err(_elapsed) = tokio::time::timeout(self.reader_join_timeout, handle).await {
                warn!(camera = self.cam_id, "frame reader did not join in time");
            }
        }

        if clean_exit {
            if let Some(path) = current_segment {
                let has_content = tokio::fs::metadata(&path).await.map(|m| m.len() > 0).unwrap_or(false);
                if has_content {
                    *self.last_archived.write() = Some(path.clone());
                    let _ = handoff_tx.send(HandOff { camera_id: self.cam_id.clone(), scratch_path: path });
                }
            }
        }

        *self.state.write() = PipelineState::Stopped;
        info!(camera = self.cam_id, "pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn sample_camera(id: &str, detection_interval: u32) -> CameraSpec {
        CameraSpec {
            id: id.to_string(),
            url: "rtsp://example/stream".to_string(),
            segment_duration: StdDuration::from_secs(300),
            detection_interval,
            enabled: true,
        }
    }

    #[test]
    fn build_args_without_detection_has_no_second_output() {
        let cam = sample_camera("cam1", 0);
        let args = build_args(&cam, std::path::Path::new("/scratch"));
        assert!(!args.iter().any(|a| a == "rawvideo"));
        assert!(args.iter().any(|a| a == "segment"));
        assert!(args.contains(&"300".to_string()));
    }

    #[test]
    fn build_args_with_detection_adds_raw_frame_output() {
        let cam = sample_camera("cam1", 5);
        let args = build_args(&cam, std::path::Path::new("/scratch"));
        assert!(args.iter().any(|a| a == "rawvideo"));
        assert!(args.iter().any(|a| a.contains("mod(n\\,5)")));
        assert!(args.contains(&"pipe:1".to_string()));
    }

    #[tokio::test]
    async fn start_failure_transitions_to_failed() {
        let cam = sample_camera("cam1", 0);
        let mut pipeline = CameraPipeline::new(
            cam,
            PathBuf::from("/tmp/does-not-matter"),
            "definitely-not-a-real-binary-xyz".to_string(),
            StdDuration::from_millis(100),
            StdDuration::from_secs(1),
            100,
        );
        let (handoff_tx, _handoff_rx) = mpsc::unbounded_channel();
        let (frame_tx, _frame_rx) = mpsc::channel(4);

        let result = pipeline.start(handoff_tx, frame_tx, StdDuration::from_millis(100)).await;
        assert!(result.is_err());
        assert!(matches!(pipeline.status().state, PipelineState::Failed { .. }));
    }

    #[tokio::test]
    async fn teardown_is_idempotent_without_a_started_pipeline() {
        let cam = sample_camera("cam1", 0);
        let mut pipeline = CameraPipeline::new(
            cam,
            PathBuf::from("/tmp/does-not-matter"),
            "true".to_string(),
            StdDuration::from_millis(100),
            StdDuration::from_secs(1),
            100,
        );
        let (handoff_tx, _handoff_rx) = mpsc::unbounded_channel();

        pipeline.teardown(&handoff_tx).await;
        pipeline.teardown(&handoff_tx).await;
        assert!(matches!(pipeline.status().state, PipelineState::Stopped));
    }
}
