// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Optional read-only log-tail and status surface (spec §4.12). No
//! authentication — explicitly out of scope.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::pipeline::{PipelineState, PipelineStatus};
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

#[derive(Serialize)]
struct StatusEntry {
    cam_id: String,
    state: String,
    frames_dropped: u64,
    last_segment_archived: Option<String>,
}

impl From<PipelineStatus> for StatusEntry {
    fn from(s: PipelineStatus) -> Self {
        let state = match s.state {
            PipelineState::Starting => "starting".to_string(),
            PipelineState::Running => "running".to_string(),
            PipelineState::Draining => "draining".to_string(),
            PipelineState::Stopped => "stopped".to_string(),
            PipelineState::Failed { reason } => format!("failed: {reason}"),
        };
        Self {
            cam_id: s.cam_id,
            state,
            frames_dropped: s.frames_dropped,
            last_segment_archived: s.last_segment_archived.map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/logs/{camera_id}", get(logs_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn logs_handler(State(state): State<AppState>, Path(camera_id): Path<String>) -> impl IntoResponse {
    match state.supervisor.logs_for(&camera_id) {
        Some(ring) => (StatusCode::OK, ring.snapshot_text()).into_response(),
        None => {
            let err = crate::error::SupervisorError::CameraNotFound { id: camera_id };
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<StatusEntry> = state.supervisor.status().into_iter().map(StatusEntry::from).collect();
    Json(entries)
}

/// Start the HTTP server. Not joined on shutdown — killed along with the
/// rest of the process (spec §4.12).
pub async fn start_server(state: AppState, port: u16) {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    info!(port, "HTTP surface listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr, error = %e, "failed to bind HTTP surface");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP surface exited with an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraSpec, HttpApiSpec, SupervisorSpec};
    use crate::frame_consumer;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn test_supervisor(scratch: &std::path::Path, archive: &std::path::Path) -> Supervisor {
        let spec = SupervisorSpec {
            scratch_dir: scratch.to_path_buf(),
            archive_dir: archive.to_path_buf(),
            max_occupied_mib: 0,
            cameras: vec![CameraSpec {
                id: "cam1".to_string(),
                url: "rtsp://example/stream".to_string(),
                segment_duration: Duration::from_secs(300),
                detection_interval: 0,
                enabled: true,
            }],
            http_api: HttpApiSpec::default(),
            log_ring_capacity: 300,
            space_check_interval: Duration::from_secs(60),
            frame_queue_capacity: 100,
            frame_offer_timeout: Duration::from_millis(500),
            graceful_terminate_timeout: Duration::from_millis(200),
            reader_join_timeout: Duration::from_secs(1),
            shutdown_join_timeout: Duration::from_secs(2),
        };
        Supervisor::start(spec, frame_consumer::noop_callback()).await.expect("start")
    }

    #[tokio::test]
    async fn status_endpoint_returns_configured_cameras() {
        let scratch = tempdir().unwrap();
        let archive = tempdir().unwrap();
        let supervisor = Arc::new(test_supervisor(scratch.path(), archive.path()).await);
        let app = build_router(AppState { supervisor: supervisor.clone() });

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        Arc::try_unwrap(supervisor).ok().unwrap().stop().await;
    }

    #[tokio::test]
    async fn logs_endpoint_404s_for_unknown_camera() {
        let scratch = tempdir().unwrap();
        let archive = tempdir().unwrap();
        let supervisor = Arc::new(test_supervisor(scratch.path(), archive.path()).await);
        let app = build_router(AppState { supervisor: supervisor.clone() });

        let response = app
            .oneshot(Request::builder().uri("/logs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        Arc::try_unwrap(supervisor).ok().unwrap().stop().await;
    }
}
