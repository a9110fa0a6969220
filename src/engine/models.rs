use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPair {
    pub client_version: String,
    pub launcher_version: String,
}

impl VersionPair {
    pub fn new(client_version: impl Into<String>, launcher_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
            launcher_version: launcher_version.into(),
        }
    }

    pub fn release_tag(&self) -> String {
        util::release_tag(&self.launcher_version)
    }

    pub fn asset_filename(&self) -> String {
        util::asset_filename(&self.launcher_version)
    }

    /// Human-readable release title.
    pub fn release_title(&self) -> &str {
        &self.client_version
    }

    pub fn release_notes(&self) -> String {
        util::release_notes(&self.client_version, &self.launcher_version)
    }
}

/// A release as seen after lookup-or-create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedRelease {
    pub id: u64,
    pub tag: String,
    pub existing_assets: BTreeSet<String>,
    pub created: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotReference {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    AlreadyPresent,
    Published,
}
