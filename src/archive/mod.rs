use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::engine::models::SnapshotReference;
use crate::env::Config;
use crate::error::MirrorError;

/// Closest archived copy of a page, as the archive reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClosestSnapshot {
    pub timestamp: String,
    pub url: String,
}

#[async_trait]
pub trait ArchiveService: Send + Sync {
    async fn closest_snapshot(&self, page_url: &str)
    -> Result<Option<ClosestSnapshot>, MirrorError>;

    /// Capture the page now and return the canonical snapshot URL.
    async fn request_snapshot(&self, page_url: &str) -> Result<String, MirrorError>;
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

/// Client for the Wayback Machine availability and save endpoints.
pub struct WaybackClient {
    client: Client,
    api_url: String,
    save_url: String,
}

impl WaybackClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            api_url: config.archive_api_url.clone(),
            save_url: config.archive_save_url.clone(),
        }
    }
}

#[async_trait]
impl ArchiveService for WaybackClient {
    async fn closest_snapshot(
        &self,
        page_url: &str,
    ) -> Result<Option<ClosestSnapshot>, MirrorError> {
        let url = Url::parse_with_params(
            &format!("{}/wayback/available", self.api_url),
            &[("url", page_url)],
        )
        .map_err(|e| MirrorError::SnapshotFailed(format!("invalid archive URL: {e}")))?;
        let availability: AvailabilityResponse = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MirrorError::SnapshotFailed(format!("availability query failed: {e}")))?
            .error_for_status()
            .map_err(|e| MirrorError::SnapshotFailed(format!("availability status error: {e}")))?
            .json()
            .await
            .map_err(|e| MirrorError::SnapshotFailed(format!("availability parse error: {e}")))?;
        Ok(availability.archived_snapshots.closest)
    }

    async fn request_snapshot(&self, page_url: &str) -> Result<String, MirrorError> {
        let save_url = format!("{}/save/{page_url}", self.save_url);
        let response = self
            .client
            .head(&save_url)
            .send()
            .await
            .map_err(|e| MirrorError::SnapshotFailed(format!("capture of {page_url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(MirrorError::SnapshotFailed(format!(
                "capture of {page_url} answered with status {}",
                response.status()
            )));
        }
        // The save endpoint redirects to the fresh snapshot.
        Ok(response.url().to_string())
    }
}

/// Parse a 14-digit `YYYYMMDDHHMMSS` archive timestamp as UTC.
pub fn parse_snapshot_timestamp(raw: &str) -> Result<DateTime<Utc>, MirrorError> {
    if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MirrorError::InvalidSnapshotTimestamp(raw.to_owned()));
    }
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| MirrorError::InvalidSnapshotTimestamp(raw.to_owned()))
}

/// Keeps an archived copy of the vendor download page at least as new as the binary.
pub struct Snapshotter {
    archive: Arc<dyn ArchiveService>,
}

impl Snapshotter {
    pub fn new(archive: Arc<dyn ArchiveService>) -> Self {
        Self { archive }
    }

    /// Return a snapshot URL of `page_url` taken at or after `freshness_threshold`
    /// (or now), capturing a new one when the closest existing copy is older.
    pub async fn ensure_snapshot(
        &self,
        page_url: &str,
        freshness_threshold: Option<DateTime<Utc>>,
    ) -> Result<String, MirrorError> {
        let threshold = freshness_threshold.unwrap_or_else(Utc::now);

        if let Some(existing) = self.closest(page_url).await? {
            if existing.timestamp >= threshold {
                debug!(
                    "archive: snapshot from {} is fresh enough for {threshold}",
                    existing.timestamp
                );
                return Ok(existing.url);
            }
            debug!(
                "archive: snapshot from {} predates {threshold}",
                existing.timestamp
            );
        } else {
            debug!("archive: no snapshot of {page_url} yet");
        }

        let url = self.archive.request_snapshot(page_url).await?;
        info!("archive: captured {page_url} as {url}");
        Ok(url)
    }

    async fn closest(&self, page_url: &str) -> Result<Option<SnapshotReference>, MirrorError> {
        match self.archive.closest_snapshot(page_url).await? {
            Some(closest) => Ok(Some(SnapshotReference {
                timestamp: parse_snapshot_timestamp(&closest.timestamp)?,
                url: closest.url,
            })),
            None => Ok(None),
        }
    }
}
