use std::time::Duration;

use crate::error::MirrorError;

const DEFAULT_REPOSITORY: &str = "ranisalt/tibia-clients";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_UPLOADS_URL: &str = "https://uploads.github.com";
const DEFAULT_ARCHIVE_API_URL: &str = "https://archive.org";
const DEFAULT_ARCHIVE_SAVE_URL: &str = "https://web.archive.org";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Everything a workflow run needs, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_version_url: String,
    pub launcher_version_url: String,
    pub launcher_download_url: String,
    pub download_page_url: String,
    pub github_token: String,
    pub github_repository: String,
    pub github_api_url: String,
    pub github_uploads_url: String,
    pub archive_api_url: String,
    pub archive_save_url: String,
    pub http_timeout: Duration,
    /// Enables the conditional version fetch when set.
    pub version_cache_path: Option<String>,
    /// Shared secret for the HTTP trigger; `serve` refuses triggers without it.
    pub trigger_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, MirrorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, MirrorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<&str> = [
            "CLIENT_VERSION_URL",
            "LAUNCHER_VERSION_URL",
            "LAUNCHER_DOWNLOAD_URL",
            "CLIENT_DOWNLOAD_PAGE_URL",
            "GITHUB_TOKEN",
        ]
        .into_iter()
        .filter(|key| optional(*key).is_none())
        .collect();
        if !missing.is_empty() {
            return Err(MirrorError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        let required = |key: &str| optional(key).unwrap_or_default();

        let http_timeout = match optional("HTTP_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(MirrorError::Configuration(format!(
                        "HTTP_TIMEOUT_SECS must be a positive integer, got {raw:?}"
                    )));
                }
            },
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            client_version_url: required("CLIENT_VERSION_URL"),
            launcher_version_url: required("LAUNCHER_VERSION_URL"),
            launcher_download_url: required("LAUNCHER_DOWNLOAD_URL"),
            download_page_url: required("CLIENT_DOWNLOAD_PAGE_URL"),
            github_token: required("GITHUB_TOKEN"),
            github_repository: optional("GITHUB_REPOSITORY")
                .unwrap_or_else(|| DEFAULT_REPOSITORY.to_owned()),
            github_api_url: trim_base(optional("GITHUB_API_URL"), DEFAULT_GITHUB_API_URL),
            github_uploads_url: trim_base(
                optional("GITHUB_UPLOADS_URL"),
                DEFAULT_GITHUB_UPLOADS_URL,
            ),
            archive_api_url: trim_base(optional("ARCHIVE_API_URL"), DEFAULT_ARCHIVE_API_URL),
            archive_save_url: trim_base(optional("ARCHIVE_SAVE_URL"), DEFAULT_ARCHIVE_SAVE_URL),
            http_timeout,
            version_cache_path: optional("VERSION_CACHE_PATH"),
            trigger_secret: optional("CRON_SECRET"),
        })
    }
}

fn trim_base(value: Option<String>, default: &str) -> String {
    value
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_owned()
}
