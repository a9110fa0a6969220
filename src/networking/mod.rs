use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use reqwest::header::{
    CACHE_CONTROL, CONTENT_TYPE, EXPIRES, HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED,
};
use reqwest::{Client, StatusCode};

use crate::error::MirrorError;
use crate::util::parse_http_date;

const USER_AGENT: &str = concat!("tibia-release-mirror/", env!("CARGO_PKG_VERSION"));

/// Result of a (possibly conditional) GET for a plain-text resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFetch {
    Fresh {
        body: String,
        last_modified: Option<String>,
        expires: Option<DateTime<Utc>>,
    },
    NotModified {
        expires: Option<DateTime<Utc>>,
    },
}

/// A binary whose headers have arrived but whose body is still in flight.
pub struct PendingBinary {
    pub content_type: Option<String>,
    /// Raw `last-modified` header text.
    pub last_modified: Option<String>,
    body: BoxFuture<'static, Result<Vec<u8>, MirrorError>>,
}

impl PendingBinary {
    pub fn new(
        content_type: Option<String>,
        last_modified: Option<String>,
        body: BoxFuture<'static, Result<Vec<u8>, MirrorError>>,
    ) -> Self {
        Self {
            content_type,
            last_modified,
            body,
        }
    }

    /// `last-modified` as an instant, when the header is a valid HTTP-date.
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified.as_deref().and_then(parse_http_date)
    }

    pub async fn bytes(self) -> Result<Vec<u8>, MirrorError> {
        self.body.await
    }
}

/// Read side of the vendor endpoints.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// GET a text resource, optionally conditional on a previous `last-modified` token.
    async fn fetch_text(
        &self,
        url: &str,
        if_modified_since: Option<&str>,
    ) -> Result<TextFetch, MirrorError>;

    /// GET a binary; resolves once the response headers are in.
    async fn open_binary(&self, url: &str) -> Result<PendingBinary, MirrorError>;
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Underlying client, shared with the release and archive APIs.
    pub fn http(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl Upstream for NetworkClient {
    async fn fetch_text(
        &self,
        url: &str,
        if_modified_since: Option<&str>,
    ) -> Result<TextFetch, MirrorError> {
        let mut request = self.client.get(url);
        if let Some(token) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MirrorError::upstream(url, e))?;

        let status = response.status();
        let expires = freshness_deadline(response.headers(), Utc::now());
        if status == StatusCode::NOT_MODIFIED {
            debug!("network client: {url} not modified");
            return Ok(TextFetch::NotModified { expires });
        }
        if !status.is_success() {
            return Err(MirrorError::upstream(url, format!("status {status}")));
        }

        let last_modified = header_text(response.headers(), LAST_MODIFIED.as_str());
        let body = response
            .text()
            .await
            .map_err(|e| MirrorError::upstream(url, e))?;
        Ok(TextFetch::Fresh {
            body,
            last_modified,
            expires,
        })
    }

    async fn open_binary(&self, url: &str) -> Result<PendingBinary, MirrorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MirrorError::Download(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Download(format!(
                "{url} answered with status {status}"
            )));
        }

        let content_type = header_text(response.headers(), CONTENT_TYPE.as_str());
        let last_modified = header_text(response.headers(), LAST_MODIFIED.as_str());
        debug!(
            "network client: {url} opened ({} bytes announced)",
            response
                .content_length()
                .map_or_else(|| "unknown".to_owned(), |len| len.to_string())
        );

        let source = url.to_owned();
        let body = async move {
            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| MirrorError::Download(format!("reading {source} failed: {e}")))
        }
        .boxed();
        Ok(PendingBinary::new(content_type, last_modified, body))
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Instant until which a response may be served from cache.
///
/// `cache-control: max-age` wins over `expires`; `no-cache`/`no-store` mean
/// the response is stale immediately.
pub fn freshness_deadline(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(cache_control) = header_text(headers, CACHE_CONTROL.as_str()) {
        let mut max_age = None;
        for directive in cache_control.split(',').map(str::trim) {
            let lower = directive.to_ascii_lowercase();
            if lower == "no-cache" || lower == "no-store" {
                return None;
            }
            if let Some(secs) = lower.strip_prefix("max-age=") {
                max_age = secs.trim_matches('"').parse::<i64>().ok();
            }
        }
        if let Some(secs) = max_age {
            return chrono::TimeDelta::try_seconds(secs)
                .and_then(|delta| now.checked_add_signed(delta));
        }
    }
    header_text(headers, EXPIRES.as_str())
        .as_deref()
        .and_then(parse_http_date)
}
