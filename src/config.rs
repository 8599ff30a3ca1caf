// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Schema-validated JSON configuration.
//!
//! The on-disk schema (`RawConfig`) mirrors the documented JSON shape
//! exactly — `snake_case` field names, extras forbidden. [`SupervisorSpec`]
//! is the validated, immutable record the rest of the supervisor consumes;
//! it is derived from `RawConfig` by [`Config::from_file`], which also
//! converts `segment_minutes` into a whole `Duration`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SupervisorError};

/// One configured camera, validated and ready for a `CameraPipeline`.
#[derive(Debug, Clone)]
pub struct CameraSpec {
    pub id: String,
    pub url: String,
    pub segment_duration: Duration,
    pub detection_interval: u32,
    pub enabled: bool,
}

/// Top-level, validated configuration for a supervisor lifetime.
#[derive(Debug, Clone)]
pub struct SupervisorSpec {
    pub scratch_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub max_occupied_mib: u64,
    pub cameras: Vec<CameraSpec>,
    pub http_api: HttpApiSpec,
    pub log_ring_capacity: usize,
    pub space_check_interval: Duration,
    pub frame_queue_capacity: usize,
    pub frame_offer_timeout: Duration,
    pub graceful_terminate_timeout: Duration,
    pub reader_join_timeout: Duration,
    pub shutdown_join_timeout: Duration,
}

/// HTTP log-tail / status surface configuration.
#[derive(Debug, Clone, Copy)]
pub struct HttpApiSpec {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpApiSpec {
    fn default() -> Self {
        Self { enabled: true, port: 8080 }
    }
}

impl SupervisorSpec {
    /// Only the `enabled` cameras, in configured order.
    pub fn enabled_cameras(&self) -> impl Iterator<Item = &CameraSpec> {
        self.cameras.iter().filter(|c| c.enabled)
    }
}

// ─────────────────────────── on-disk schema ───────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    #[serde(default)]
    max_occupied_space_mb: u64,
    #[serde(default)]
    http_api: Option<RawHttpApi>,
    cameras: Vec<RawCamera>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHttpApi {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCamera {
    id: String,
    url: String,
    segment_minutes: f64,
    #[serde(default)]
    detection_interval: u32,
    #[serde(default = "default_true")]
    enabled: bool,
}

pub struct Config;

impl Config {
    /// Load and validate configuration from a JSON file at `path`.
    pub fn from_file(path: &Path) -> Result<SupervisorSpec> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!("Cannot read config file {path:?}: {e}"))
        })?;
        Self::from_str(&content)
    }

    /// Parse and validate configuration from a JSON string. Split out of
    /// [`Config::from_file`] so tests can exercise validation without
    /// touching the filesystem.
    pub fn from_str(content: &str) -> Result<SupervisorSpec> {
        let raw: RawConfig = serde_json::from_str(content)
            .map_err(|e| SupervisorError::Config(format!("Invalid JSON: {e}")))?;
        validate_and_build(raw)
    }
}

fn validate_and_build(raw: RawConfig) -> Result<SupervisorSpec> {
    if raw.cameras.is_empty() {
        return Err(SupervisorError::Config("No cameras defined".into()));
    }

    let mut cameras = Vec::with_capacity(raw.cameras.len());
    let mut seen_ids = std::collections::HashSet::new();

    for cam in raw.cameras {
        if cam.id.is_empty() {
            return Err(SupervisorError::Config("Camera id must not be empty".into()));
        }
        if cam.id.contains('_') {
            return Err(SupervisorError::Config(format!(
                "Camera id '{}' must not contain '_'",
                cam.id
            )));
        }
        if !seen_ids.insert(cam.id.clone()) {
            return Err(SupervisorError::Config(format!("Duplicate camera id '{}'", cam.id)));
        }
        if cam.segment_minutes <= 0.0 {
            return Err(SupervisorError::Config(format!(
                "Camera '{}': segment_minutes must be > 0",
                cam.id
            )));
        }

        cameras.push(CameraSpec {
            id: cam.id,
            url: cam.url,
            segment_duration: Duration::from_secs_f64(cam.segment_minutes * 60.0),
            detection_interval: cam.detection_interval,
            enabled: cam.enabled,
        });
    }

    let http_api = match raw.http_api {
        Some(h) => HttpApiSpec { enabled: h.enabled, port: h.port },
        None => HttpApiSpec::default(),
    };

    Ok(SupervisorSpec {
        scratch_dir: raw.scratch_dir,
        archive_dir: raw.output_dir,
        max_occupied_mib: raw.max_occupied_space_mb,
        cameras,
        http_api,
        log_ring_capacity: 300,
        space_check_interval: Duration::from_secs(60),
        frame_queue_capacity: 100,
        frame_offer_timeout: Duration::from_millis(500),
        graceful_terminate_timeout: Duration::from_secs(5),
        reader_join_timeout: Duration::from_secs(2),
        shutdown_join_timeout: Duration::from_secs(5),
    })
}
