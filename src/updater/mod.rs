use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::models::VersionPair;
use crate::env::Config;
use crate::error::MirrorError;
use crate::networking::{TextFetch, Upstream};
use crate::storage::KeyValueStore;

const CACHE_KEY_PREFIX: &str = "version:";

/// What the conditional fetch remembers about one version URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedVersion {
    value: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
}

/// Fetches the current client and launcher versions from the vendor.
pub struct VersionResolver {
    upstream: Arc<dyn Upstream>,
    client_version_url: String,
    launcher_version_url: String,
    cache: Option<Arc<dyn KeyValueStore>>,
}

impl VersionResolver {
    pub fn new(
        config: &Config,
        upstream: Arc<dyn Upstream>,
        cache: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        Self {
            upstream,
            client_version_url: config.client_version_url.clone(),
            launcher_version_url: config.launcher_version_url.clone(),
            cache,
        }
    }

    /// Resolve both versions concurrently; either failure fails the pair.
    pub async fn resolve(&self) -> Result<VersionPair, MirrorError> {
        if self.client_version_url.is_empty() || self.launcher_version_url.is_empty() {
            return Err(MirrorError::Configuration(
                "missing CLIENT_VERSION_URL or LAUNCHER_VERSION_URL".into(),
            ));
        }

        let (client_version, launcher_version) = tokio::try_join!(
            self.version_at(&self.client_version_url),
            self.version_at(&self.launcher_version_url),
        )?;
        info!("updater: client {client_version}, launcher {launcher_version}");
        Ok(VersionPair::new(client_version, launcher_version))
    }

    async fn version_at(&self, url: &str) -> Result<String, MirrorError> {
        match &self.cache {
            Some(cache) => self.cached_version_at(cache.as_ref(), url).await,
            None => match self.upstream.fetch_text(url, None).await? {
                TextFetch::Fresh { body, .. } => normalize_version(url, &body),
                TextFetch::NotModified { .. } => Err(MirrorError::upstream(
                    url,
                    "not modified answer to an unconditional request",
                )),
            },
        }
    }

    async fn cached_version_at(
        &self,
        cache: &dyn KeyValueStore,
        url: &str,
    ) -> Result<String, MirrorError> {
        let key = format!("{CACHE_KEY_PREFIX}{url}");
        let cached = match cache.get(&key).await {
            Ok(raw) => raw.and_then(|raw| serde_json::from_str::<CachedVersion>(&raw).ok()),
            Err(err) => {
                warn!("updater: version cache unavailable, fetching {url} directly ({err})");
                None
            }
        };

        if let Some(entry) = &cached
            && entry.expires.is_some_and(|expires| expires > Utc::now())
        {
            debug!("updater: {url} served from cache");
            return Ok(entry.value.clone());
        }

        let token = cached.as_ref().and_then(|entry| entry.last_modified.as_deref());
        let entry = match self.upstream.fetch_text(url, token).await? {
            TextFetch::NotModified { expires } => match cached {
                Some(entry) => {
                    debug!("updater: {url} not modified");
                    CachedVersion { expires, ..entry }
                }
                None => {
                    return Err(MirrorError::upstream(
                        url,
                        "not modified answer without a cached version",
                    ));
                }
            },
            TextFetch::Fresh {
                body,
                last_modified,
                expires,
            } => CachedVersion {
                value: normalize_version(url, &body)?,
                last_modified,
                expires,
            },
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = cache.set(&key, raw).await {
                    warn!("updater: failed to update version cache for {url}: {err}");
                }
            }
            Err(err) => warn!("updater: failed to serialize cache entry for {url}: {err}"),
        }
        Ok(entry.value)
    }
}

/// Version bodies are used verbatim apart from surrounding whitespace.
fn normalize_version(url: &str, body: &str) -> Result<String, MirrorError> {
    let version = body.trim();
    if version.is_empty() {
        return Err(MirrorError::upstream(url, "empty version string"));
    }
    Ok(version.to_owned())
}
