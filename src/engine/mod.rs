use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::archive::{ArchiveService, Snapshotter, WaybackClient};
use crate::engine::models::{LocatedRelease, PublishOutcome, VersionPair};
use crate::engine::state::{RunOutcome, RunState};
use crate::env::Config;
use crate::error::MirrorError;
use crate::github::{GitHubClient, ReleaseHost};
use crate::networking::{NetworkClient, Upstream};
use crate::publisher::AssetPublisher;
use crate::releases::ReleaseLocator;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::updater::VersionResolver;

pub mod models;
pub mod state;

/// Check the trigger's `authorization` header against the shared secret.
///
/// An empty secret is a configuration error, never a match.
pub fn authorize(header: Option<&str>, secret: &str) -> Result<(), MirrorError> {
    if secret.trim().is_empty() {
        return Err(MirrorError::Configuration("missing CRON_SECRET".into()));
    }
    match header {
        Some(header) if header.trim() == format!("Bearer {secret}") => Ok(()),
        Some(_) => {
            warn!("engine: rejected trigger with wrong credentials");
            Err(MirrorError::Unauthorized)
        }
        None => {
            warn!("engine: rejected trigger without credentials");
            Err(MirrorError::Unauthorized)
        }
    }
}

/// A release that still lacks its launcher asset.
#[derive(Clone, Debug)]
pub struct PendingPublish {
    pub versions: VersionPair,
    pub release: LocatedRelease,
    pub filename: String,
    pub notes: String,
}

/// Result of the read-mostly first half of a run.
#[derive(Debug)]
pub enum Prepared {
    Done(RunOutcome),
    Pending(PendingPublish),
}

struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new(state: RunState) -> Self {
        Self { state }
    }

    fn advance(&mut self, next: RunState) {
        debug!("engine: {} -> {}", self.state, next);
        self.state = next;
    }

    fn failed(&mut self, err: MirrorError) -> MirrorError {
        error!("engine: run failed after {}: {err}", self.state);
        self.state = RunState::Failed(err.kind());
        err
    }
}

/// Sequences one mirroring run.
pub struct Mirror {
    resolver: VersionResolver,
    locator: ReleaseLocator,
    publisher: AssetPublisher,
    download_url: String,
}

impl Mirror {
    /// Wire the real HTTP collaborators.
    ///
    /// `long_lived` processes remember versions in memory when no cache file is configured.
    pub fn from_config(config: &Config, long_lived: bool) -> Self {
        let network = NetworkClient::new(config.http_timeout);
        let host: Arc<dyn ReleaseHost> = Arc::new(GitHubClient::new(config, network.http()));
        let archive: Arc<dyn ArchiveService> =
            Arc::new(WaybackClient::new(config, network.http()));
        let cache: Option<Arc<dyn KeyValueStore>> = match &config.version_cache_path {
            Some(path) => {
                info!("engine: conditional version fetch enabled ({path})");
                Some(Arc::new(FileStore::new(path)))
            }
            None if long_lived => {
                debug!("engine: conditional version fetch kept in memory");
                Some(Arc::new(MemoryStore::default()))
            }
            None => None,
        };
        Self::new(config, Arc::new(network), host, archive, cache)
    }

    pub fn new(
        config: &Config,
        upstream: Arc<dyn Upstream>,
        host: Arc<dyn ReleaseHost>,
        archive: Arc<dyn ArchiveService>,
        cache: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        Self {
            resolver: VersionResolver::new(config, upstream.clone(), cache),
            locator: ReleaseLocator::new(host.clone()),
            publisher: AssetPublisher::new(config, host, upstream, Snapshotter::new(archive)),
            download_url: config.launcher_download_url.clone(),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, MirrorError> {
        match self.prepare().await? {
            Prepared::Done(outcome) => Ok(outcome),
            Prepared::Pending(pending) => self.publish(pending).await,
        }
    }

    /// Resolve versions and the release, stopping early when the asset is already there.
    pub async fn prepare(&self) -> Result<Prepared, MirrorError> {
        let mut tracker = RunTracker::new(RunState::Start);

        let versions = self
            .resolver
            .resolve()
            .await
            .map_err(|e| tracker.failed(e))?;
        let tag = versions.release_tag();
        let filename = versions.asset_filename();
        let notes = versions.release_notes();
        tracker.advance(RunState::VersionResolved { tag: tag.clone() });

        let release = self
            .locator
            .locate_or_create(&tag, versions.release_title(), &notes)
            .await
            .map_err(|e| tracker.failed(e))?;
        tracker.advance(RunState::ReleaseResolved {
            tag: tag.clone(),
            release_id: release.id,
            created: release.created,
        });

        if release.existing_assets.contains(&filename) {
            tracker.advance(RunState::AssetAlreadyPresent);
            info!("engine: {filename} already mirrored, nothing to do");
            return Ok(Prepared::Done(RunOutcome::UpToDate {
                tag,
                asset: filename,
            }));
        }

        tracker.advance(RunState::AssetMissing);
        Ok(Prepared::Pending(PendingPublish {
            versions,
            release,
            filename,
            notes,
        }))
    }

    pub async fn publish(&self, pending: PendingPublish) -> Result<RunOutcome, MirrorError> {
        let mut tracker = RunTracker::new(RunState::AssetMissing);
        let outcome = self
            .publisher
            .publish(
                pending.release.id,
                &pending.release.existing_assets,
                &pending.filename,
                &self.download_url,
                &pending.notes,
            )
            .await
            .map_err(|e| tracker.failed(e))?;

        let tag = pending.release.tag;
        let asset = pending.filename;
        match outcome {
            PublishOutcome::AlreadyPresent => {
                tracker.advance(RunState::AssetAlreadyPresent);
                Ok(RunOutcome::UpToDate { tag, asset })
            }
            PublishOutcome::Published => {
                tracker.advance(RunState::Published);
                Ok(RunOutcome::Published { tag, asset })
            }
        }
    }

    pub async fn latest_asset_url(&self) -> Result<Option<String>, MirrorError> {
        self.locator.latest_asset_url().await
    }
}
