use std::collections::BTreeSet;
use std::sync::Arc;

use log::{error, info, warn};

use crate::archive::Snapshotter;
use crate::engine::models::PublishOutcome;
use crate::env::Config;
use crate::error::{MirrorError, PublishStep};
use crate::github::ReleaseHost;
use crate::networking::Upstream;
use crate::util::provenance_notes;

const DEFAULT_CONTENT_TYPE: &str = "application/x-gzip";

/// Mirrors the launcher binary onto a release together with its provenance.
pub struct AssetPublisher {
    host: Arc<dyn ReleaseHost>,
    upstream: Arc<dyn Upstream>,
    snapshotter: Snapshotter,
    download_page_url: String,
}

impl AssetPublisher {
    pub fn new(
        config: &Config,
        host: Arc<dyn ReleaseHost>,
        upstream: Arc<dyn Upstream>,
        snapshotter: Snapshotter,
    ) -> Self {
        Self {
            host,
            upstream,
            snapshotter,
            download_page_url: config.download_page_url.clone(),
        }
    }

    /// Upload `filename` unless the release already carries it.
    ///
    /// On a failed upload or notes update nothing is rolled back: whatever the
    /// successful half wrote stays on the release, and a re-run whose asset
    /// made it sees `AlreadyPresent`.
    pub async fn publish(
        &self,
        release_id: u64,
        existing_assets: &BTreeSet<String>,
        filename: &str,
        download_url: &str,
        notes_template: &str,
    ) -> Result<PublishOutcome, MirrorError> {
        if existing_assets.contains(filename) {
            info!("publisher: {filename} already attached to release {release_id}");
            return Ok(PublishOutcome::AlreadyPresent);
        }

        let binary = self.upstream.open_binary(download_url).await?;
        let last_modified = binary.last_modified.clone();
        let threshold = binary.last_modified_at();
        if threshold.is_none()
            && let Some(raw) = &last_modified
        {
            warn!("publisher: unparseable last-modified {raw:?}, requiring a snapshot from now");
        }
        let content_type = binary
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

        let (bytes, snapshot_url) = tokio::try_join!(
            binary.bytes(),
            self.snapshotter
                .ensure_snapshot(&self.download_page_url, threshold),
        )?;
        info!(
            "publisher: uploading {filename} ({} bytes, {content_type}) to release {release_id}",
            bytes.len()
        );

        let notes = provenance_notes(notes_template, last_modified.as_deref(), &snapshot_url);
        // Both halves always run to completion so the error can name each failure.
        let (upload, update) = tokio::join!(
            self.host
                .upload_asset(release_id, filename, &content_type, bytes),
            self.host.update_release_notes(release_id, &notes),
        );

        match (upload, update) {
            (Ok(()), Ok(())) => {
                info!("publisher: published {filename} to release {release_id}");
                Ok(PublishOutcome::Published)
            }
            (Err(err), Ok(())) => Err(half_failed(PublishStep::Upload, err.to_string())),
            (Ok(()), Err(err)) => Err(half_failed(PublishStep::Notes, err.to_string())),
            (Err(upload_err), Err(update_err)) => Err(half_failed(
                PublishStep::UploadAndNotes,
                format!("{upload_err}; {update_err}"),
            )),
        }
    }
}

fn half_failed(step: PublishStep, reason: String) -> MirrorError {
    error!("publisher: {step} failed: {reason}");
    MirrorError::PublishFailed { step, reason }
}
