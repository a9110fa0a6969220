use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;

use crate::engine::models::LocatedRelease;
use crate::error::MirrorError;
use crate::github::{ReleaseHost, ReleaseLookup};
use crate::util::is_launcher_asset;

/// Finds the release for a tag, creating it on first sight.
///
/// Two overlapping runs for a new tag can both see `NotFound` and both create;
/// only the hosting platform's own tag uniqueness stands in the way.
#[derive(Clone)]
pub struct ReleaseLocator {
    host: Arc<dyn ReleaseHost>,
}

impl ReleaseLocator {
    pub fn new(host: Arc<dyn ReleaseHost>) -> Self {
        Self { host }
    }

    pub async fn locate_or_create(
        &self,
        tag: &str,
        title: &str,
        notes: &str,
    ) -> Result<LocatedRelease, MirrorError> {
        match self.host.release_by_tag(tag).await? {
            ReleaseLookup::Found(release) => {
                info!(
                    "releases: {tag} already exists as {} with {} asset(s)",
                    release.id,
                    release.assets.len()
                );
                Ok(LocatedRelease {
                    id: release.id,
                    tag: release.tag_name,
                    existing_assets: release.assets.into_iter().map(|a| a.name).collect(),
                    created: false,
                })
            }
            ReleaseLookup::NotFound => {
                info!("releases: creating {tag}");
                let release = self.host.create_release(tag, title, notes).await?;
                Ok(LocatedRelease {
                    id: release.id,
                    tag: tag.to_owned(),
                    existing_assets: BTreeSet::new(),
                    created: true,
                })
            }
        }
    }

    /// Download URL of the launcher archive on the newest release, if any.
    pub async fn latest_asset_url(&self) -> Result<Option<String>, MirrorError> {
        let Some(release) = self.host.latest_release().await? else {
            return Ok(None);
        };
        Ok(release
            .assets
            .into_iter()
            .find(|asset| is_launcher_asset(&asset.name))
            .map(|asset| asset.browser_download_url))
    }
}
