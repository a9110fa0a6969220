//! Minimal GitHub Releases client.
//!
//! Only the calls the mirror needs are covered: lookup by tag, create, notes
//! update, asset upload and the latest release.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::env::Config;
use crate::error::MirrorError;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// A release's asset. Does not contain all fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// A GitHub release. Does not contain all fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Outcome of a lookup by tag; absence is an ordinary answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseLookup {
    Found(Release),
    NotFound,
}

#[derive(Serialize)]
struct NewRelease<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct NotesUpdate<'a> {
    body: &'a str,
}

#[async_trait]
pub trait ReleaseHost: Send + Sync {
    async fn release_by_tag(&self, tag: &str) -> Result<ReleaseLookup, MirrorError>;

    async fn create_release(
        &self,
        tag: &str,
        title: &str,
        notes: &str,
    ) -> Result<Release, MirrorError>;

    async fn update_release_notes(&self, release_id: u64, notes: &str) -> Result<(), MirrorError>;

    async fn upload_asset(
        &self,
        release_id: u64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), MirrorError>;

    async fn latest_release(&self) -> Result<Option<Release>, MirrorError>;
}

pub struct GitHubClient {
    client: Client,
    token: String,
    repository: String,
    api_url: String,
    uploads_url: String,
}

impl GitHubClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            token: config.github_token.clone(),
            repository: config.github_repository.clone(),
            api_url: config.github_api_url.clone(),
            uploads_url: config.github_uploads_url.clone(),
        }
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repository)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header("x-github-api-version", GITHUB_API_VERSION)
    }
}

async fn api_error(action: &str, response: Response) -> MirrorError {
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    let detail = detail.trim();
    if detail.is_empty() {
        MirrorError::ReleaseApi(format!("{action} answered with status {status}"))
    } else {
        MirrorError::ReleaseApi(format!("{action} answered with status {status}: {detail}"))
    }
}

fn transport_error(action: &str, err: reqwest::Error) -> MirrorError {
    MirrorError::ReleaseApi(format!("{action} failed: {err}"))
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn release_by_tag(&self, tag: &str) -> Result<ReleaseLookup, MirrorError> {
        let action = format!("lookup of release {tag}");
        let url = format!("{}/tags/{tag}", self.releases_url());
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| transport_error(&action, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("github: no release tagged {tag}");
                Ok(ReleaseLookup::NotFound)
            }
            status if status.is_success() => response
                .json::<Release>()
                .await
                .map(ReleaseLookup::Found)
                .map_err(|e| transport_error(&action, e)),
            _ => Err(api_error(&action, response).await),
        }
    }

    async fn create_release(
        &self,
        tag: &str,
        title: &str,
        notes: &str,
    ) -> Result<Release, MirrorError> {
        let action = format!("creation of release {tag}");
        let response = self
            .authorized(self.client.post(self.releases_url()))
            .json(&NewRelease {
                tag_name: tag,
                name: title,
                body: notes,
            })
            .send()
            .await
            .map_err(|e| transport_error(&action, e))?;
        if !response.status().is_success() {
            return Err(api_error(&action, response).await);
        }
        response
            .json::<Release>()
            .await
            .map_err(|e| transport_error(&action, e))
    }

    async fn update_release_notes(&self, release_id: u64, notes: &str) -> Result<(), MirrorError> {
        let action = format!("update of release {release_id}");
        let url = format!("{}/{release_id}", self.releases_url());
        let response = self
            .authorized(self.client.patch(&url))
            .json(&NotesUpdate { body: notes })
            .send()
            .await
            .map_err(|e| transport_error(&action, e))?;
        if !response.status().is_success() {
            return Err(api_error(&action, response).await);
        }
        Ok(())
    }

    async fn upload_asset(
        &self,
        release_id: u64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), MirrorError> {
        let action = format!("upload of {filename} to release {release_id}");
        let url = Url::parse_with_params(
            &format!(
                "{}/repos/{}/releases/{release_id}/assets",
                self.uploads_url, self.repository
            ),
            &[("name", filename)],
        )
        .map_err(|e| MirrorError::ReleaseApi(format!("invalid upload URL: {e}")))?;
        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(&action, e))?;
        if !response.status().is_success() {
            return Err(api_error(&action, response).await);
        }
        Ok(())
    }

    async fn latest_release(&self) -> Result<Option<Release>, MirrorError> {
        let action = "lookup of the latest release";
        let url = format!("{}/latest", self.releases_url());
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| transport_error(action, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Release>()
                .await
                .map(Some)
                .map_err(|e| transport_error(action, e)),
            _ => Err(api_error(action, response).await),
        }
    }
}
