// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Composes every worker and owns the camera pipeline table (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SupervisorSpec;
use crate::error::Result;
use crate::file_mover;
use crate::frame::Frame;
use crate::frame_consumer::{self, AnalysisCallback};
use crate::log_ring::LogRing;
use crate::pipeline::{CameraPipeline, PipelineStatus};
use crate::segment_tracker::HandOff;
use crate::space_enforcer::SpaceEnforcer;

const MEDIA_TOOL: &str = "ffmpeg";

/// Top-level object: one per process. Starts every worker and camera
/// pipeline, and drives the shutdown sequence.
pub struct Supervisor {
    spec: SupervisorSpec,
    pipelines: Arc<RwLock<HashMap<String, CameraPipeline>>>,
    cancel: CancellationToken,
    handoff_tx: mpsc::UnboundedSender<HandOff>,
    background: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Create queues and the cancellation token, run the leftover sweep,
    /// start the process-wide workers, then start one pipeline per enabled
    /// camera.
    pub async fn start(spec: SupervisorSpec, analysis_callback: AnalysisCallback) -> Result<Self> {
        tokio::fs::create_dir_all(&spec.scratch_dir).await?;

        let cancel = CancellationToken::new();
        let (handoff_tx, handoff_rx) = mpsc::unbounded_channel::<HandOff>();
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(spec.frame_queue_capacity);

        file_mover::leftover_sweep(&spec.scratch_dir, &handoff_tx).await;

        let enforcer = Arc::new(SpaceEnforcer::new(spec.archive_dir.clone(), spec.max_occupied_mib));

        let mut background = Vec::new();
        background.push(tokio::spawn(file_mover::run(handoff_rx, spec.archive_dir.clone(), enforcer.clone())));
        background.push(tokio::spawn(frame_consumer::run(frame_rx, analysis_callback, cancel.clone())));
        background.push(tokio::spawn(enforcer.run_periodic(spec.space_check_interval, cancel.clone())));

        let mut pipelines = HashMap::new();
        for camera in spec.enabled_cameras() {
            let mut pipeline = CameraPipeline::new(
                camera.clone(),
                spec.scratch_dir.clone(),
                MEDIA_TOOL.to_string(),
                spec.graceful_terminate_timeout,
                spec.reader_join_timeout,
                spec.log_ring_capacity,
            );
            if let Err(e) = pipeline.start(handoff_tx.clone(), frame_tx.clone(), spec.frame_offer_timeout).await {
                tracing::error!(camera = camera.id, error = %e, "camera failed to start, continuing with others");
            }
            pipelines.insert(camera.id.clone(), pipeline);
        }
        drop(frame_tx);

        info!(cameras = pipelines.len(), "supervisor started");

        Ok(Self {
            spec,
            pipelines: Arc::new(RwLock::new(pipelines)),
            cancel,
            handoff_tx,
            background,
        })
    }

    /// Snapshot of every camera's pipeline state and drop counter.
    pub fn status(&self) -> Vec<PipelineStatus> {
        self.pipelines.read().values().map(|p| p.status()).collect()
    }

    /// Current `LogRing` for a camera, or `None` if the id is unknown.
    pub fn logs_for(&self, cam_id: &str) -> Option<Arc<LogRing>> {
        self.pipelines.read().get(cam_id).map(|p| p.logs())
    }

    pub fn known_camera_ids(&self) -> Vec<String> {
        self.pipelines.read().keys().cloned().collect()
    }

    /// Cancel all workers, tear down every pipeline, then join the
    /// process-wide workers with a bound.
    pub async fn stop(mut self) {
        info!("supervisor shutting down");
        self.cancel.cancel();

        let cam_ids: Vec<String> = self.pipelines.read().keys().cloned().collect();
        for cam_id in cam_ids {
            // Take the pipeline out so teardown's await doesn't hold the lock.
            let taken = self.pipelines.write().remove(&cam_id);
            if let Some(mut pipeline) = taken {
                pipeline.teardown(&self.handoff_tx).await;
                self.pipelines.write().insert(cam_id, pipeline);
            }
        }

        drop(self.handoff_tx);

        for handle in self.background {
            if tokio::time::timeout(self.spec.shutdown_join_timeout, handle).await.is_err() {
                tracing::warn!("background worker did not join within the shutdown bound");
            }
        }

        info!("supervisor shutdown complete");
    }
}
