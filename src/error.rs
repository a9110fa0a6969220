use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use log::{error, warn};
use serde::Serialize;

/// Which half of the publish fan-out failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Upload,
    Notes,
    UploadAndNotes,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PublishStep::Upload => "asset upload",
            PublishStep::Notes => "release notes update",
            PublishStep::UploadAndNotes => "asset upload and release notes update",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unauthorized trigger")]
    Unauthorized,

    #[error("upstream fetch of {url} failed: {reason}")]
    UpstreamFetch { url: String, reason: String },

    #[error("invalid snapshot timestamp {0:?}")]
    InvalidSnapshotTimestamp(String),

    #[error("snapshot capture failed: {0}")]
    SnapshotFailed(String),

    #[error("release API error: {0}")]
    ReleaseApi(String),

    #[error("binary download failed: {0}")]
    Download(String),

    #[error("{step} failed: {reason}")]
    PublishFailed { step: PublishStep, reason: String },
}

impl MirrorError {
    pub fn upstream(url: &str, reason: impl fmt::Display) -> Self {
        MirrorError::UpstreamFetch {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Stable classification used in response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::Configuration(_) => "missing_configuration",
            MirrorError::Unauthorized => "unauthorized",
            MirrorError::UpstreamFetch { .. } => "upstream_fetch_failed",
            MirrorError::InvalidSnapshotTimestamp(_) => "invalid_snapshot_timestamp",
            MirrorError::SnapshotFailed(_) => "snapshot_failed",
            MirrorError::ReleaseApi(_) => "release_api_error",
            MirrorError::Download(_) => "download_failed",
            MirrorError::PublishFailed { .. } => "publish_failed",
        }
    }

    /// Process exit code for one-shot runs.
    pub fn exit_code(&self) -> u8 {
        match self {
            MirrorError::Unauthorized => 77,
            MirrorError::Configuration(_) => 78,
            _ => 1,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for MirrorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MirrorError::Unauthorized => {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            MirrorError::Configuration(message) => {
                error!("server: configuration error: {message}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            other => {
                warn!("server: run failed ({}): {other}", other.kind());
                StatusCode::BAD_GATEWAY
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.kind().to_owned(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
