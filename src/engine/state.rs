use std::fmt;

use serde::Serialize;

// Where a single run currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Start,
    VersionResolved { tag: String },
    ReleaseResolved {
        tag: String,
        release_id: u64,
        created: bool,
    },
    AssetAlreadyPresent,
    AssetMissing,
    Published,
    Failed(&'static str),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Start => f.write_str("start"),
            RunState::VersionResolved { tag } => write!(f, "version resolved ({tag})"),
            RunState::ReleaseResolved {
                tag,
                release_id,
                created,
            } => {
                let origin = if *created { "created" } else { "existing" };
                write!(f, "release resolved ({tag} as {release_id}, {origin})")
            }
            RunState::AssetAlreadyPresent => f.write_str("asset already present"),
            RunState::AssetMissing => f.write_str("asset missing"),
            RunState::Published => f.write_str("published"),
            RunState::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Externally visible result of a successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    UpToDate { tag: String, asset: String },
    Published { tag: String, asset: String },
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::UpToDate { .. } => 0,
            RunOutcome::Published { .. } => 10,
        }
    }
}
