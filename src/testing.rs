//! In-memory stand-ins for the vendor, the archive and the release host.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use futures_util::FutureExt;

use crate::archive::{ArchiveService, ClosestSnapshot};
use crate::env::Config;
use crate::error::MirrorError;
use crate::github::{Release, ReleaseAsset, ReleaseHost, ReleaseLookup};
use crate::networking::{PendingBinary, TextFetch, Upstream};

pub const CLIENT_URL: &str = "https://vendor.test/client.txt";
pub const LAUNCHER_URL: &str = "https://vendor.test/launcher.txt";
pub const DOWNLOAD_URL: &str = "https://vendor.test/launcher.tar.gz";
pub const PAGE_URL: &str = "https://vendor.test/download";

pub fn test_config() -> Config {
    let values: HashMap<&str, &str> = HashMap::from([
        ("CLIENT_VERSION_URL", CLIENT_URL),
        ("LAUNCHER_VERSION_URL", LAUNCHER_URL),
        ("LAUNCHER_DOWNLOAD_URL", DOWNLOAD_URL),
        ("CLIENT_DOWNLOAD_PAGE_URL", PAGE_URL),
        ("GITHUB_TOKEN", "ghp_test"),
    ]);
    Config::from_lookup(|key| values.get(key).map(|v| (*v).to_owned()))
        .expect("test configuration is complete")
}

#[derive(Default)]
struct UpstreamState {
    versions: HashMap<String, String>,
    failing: Vec<String>,
    text_calls: HashMap<String, usize>,
    last_modified: Option<String>,
    max_age_secs: Option<i64>,
    not_modified: usize,
    binary_content_type: Option<String>,
    binary_last_modified: Option<String>,
    binary_fails: bool,
    binary_calls: usize,
}

pub struct FakeUpstream {
    state: Mutex<UpstreamState>,
}

impl FakeUpstream {
    pub const BINARY: &'static [u8] = b"\x1f\x8blauncher";

    pub fn with_versions(client: &str, launcher: &str) -> Self {
        let state = UpstreamState {
            versions: HashMap::from([
                (CLIENT_URL.to_owned(), format!("{client}\n")),
                (LAUNCHER_URL.to_owned(), format!("{launcher}\n")),
            ]),
            binary_content_type: Some("application/gzip".into()),
            binary_last_modified: Some("Fri, 01 Mar 2024 12:00:00 GMT".into()),
            ..UpstreamState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UpstreamState> {
        self.state.lock().unwrap()
    }

    pub fn set_version(&self, url: &str, version: &str) {
        self.lock().versions.insert(url.to_owned(), version.to_owned());
    }

    pub fn fail_text(&self, url: &str) {
        self.lock().failing.push(url.to_owned());
    }

    /// Fresh answers carry this `last-modified`; requests quoting it get a 304.
    pub fn set_last_modified(&self, token: &str) {
        self.lock().last_modified = Some(token.to_owned());
    }

    pub fn set_max_age(&self, secs: i64) {
        self.lock().max_age_secs = Some(secs);
    }

    pub fn clear_binary_content_type(&self) {
        self.lock().binary_content_type = None;
    }

    pub fn set_binary_last_modified(&self, raw: &str) {
        self.lock().binary_last_modified = Some(raw.to_owned());
    }

    pub fn fail_binary(&self) {
        self.lock().binary_fails = true;
    }

    pub fn text_calls(&self, url: &str) -> usize {
        self.lock().text_calls.get(url).copied().unwrap_or(0)
    }

    pub fn not_modified_answers(&self) -> usize {
        self.lock().not_modified
    }

    pub fn binary_calls(&self) -> usize {
        self.lock().binary_calls
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_text(
        &self,
        url: &str,
        if_modified_since: Option<&str>,
    ) -> Result<TextFetch, MirrorError> {
        let mut state = self.lock();
        *state.text_calls.entry(url.to_owned()).or_default() += 1;
        if state.failing.iter().any(|failing| failing == url) {
            return Err(MirrorError::upstream(url, "status 503 Service Unavailable"));
        }
        let expires = state
            .max_age_secs
            .map(|secs| Utc::now() + chrono::TimeDelta::seconds(secs));
        if if_modified_since.is_some() && if_modified_since == state.last_modified.as_deref() {
            state.not_modified += 1;
            return Ok(TextFetch::NotModified { expires });
        }
        let body = state
            .versions
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::upstream(url, "status 404 Not Found"))?;
        Ok(TextFetch::Fresh {
            body,
            last_modified: state.last_modified.clone(),
            expires,
        })
    }

    async fn open_binary(&self, url: &str) -> Result<PendingBinary, MirrorError> {
        let mut state = self.lock();
        state.binary_calls += 1;
        if state.binary_fails {
            return Err(MirrorError::Download(format!(
                "{url} answered with status 500 Internal Server Error"
            )));
        }
        Ok(PendingBinary::new(
            state.binary_content_type.clone(),
            state.binary_last_modified.clone(),
            async { Ok(FakeUpstream::BINARY.to_vec()) }.boxed(),
        ))
    }
}

pub struct FakeArchive {
    closest: Option<ClosestSnapshot>,
    capture_fails: AtomicBool,
    queries: AtomicUsize,
    captures: AtomicUsize,
}

impl FakeArchive {
    pub fn with_closest(timestamp: &str) -> Self {
        Self {
            closest: Some(ClosestSnapshot {
                timestamp: timestamp.to_owned(),
                url: format!("http://web.archive.org/web/{timestamp}/{PAGE_URL}"),
            }),
            ..Self::empty()
        }
    }

    pub fn empty() -> Self {
        Self {
            closest: None,
            capture_fails: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
        }
    }

    pub fn fail_capture(&self) {
        self.capture_fails.store(true, Ordering::SeqCst);
    }

    pub fn closest_url(&self) -> String {
        self.closest
            .as_ref()
            .map(|closest| closest.url.clone())
            .unwrap_or_default()
    }

    pub fn capture_url(&self) -> String {
        format!("https://web.archive.org/web/20990101000000/{PAGE_URL}")
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveService for FakeArchive {
    async fn closest_snapshot(
        &self,
        _page_url: &str,
    ) -> Result<Option<ClosestSnapshot>, MirrorError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.closest.clone())
    }

    async fn request_snapshot(&self, page_url: &str) -> Result<String, MirrorError> {
        if self.capture_fails.load(Ordering::SeqCst) {
            return Err(MirrorError::SnapshotFailed(format!(
                "capture of {page_url} answered with status 523"
            )));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.capture_url())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedUpload {
    pub release_id: u64,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct HostState {
    releases: Vec<Release>,
    next_id: u64,
    lookups: usize,
    creates: usize,
    notes_updates: usize,
    upload_attempts: usize,
    uploads: Vec<RecordedUpload>,
    lookup_fails: bool,
    upload_fails: bool,
    notes_fail: bool,
}

impl HostState {
    fn insert(&mut self, tag: &str, title: Option<&str>, body: Option<&str>, assets: &[&str]) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.releases.push(Release {
            id,
            tag_name: tag.to_owned(),
            name: title.map(str::to_owned),
            body: body.map(str::to_owned),
            assets: assets.iter().map(|name| asset(tag, name)).collect(),
        });
        id
    }
}

fn asset(tag: &str, name: &str) -> ReleaseAsset {
    ReleaseAsset {
        name: name.to_owned(),
        browser_download_url: format!("https://downloads.test/{tag}/{name}"),
    }
}

/// Release host that keeps releases in memory and counts every call.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
    // Checked before locking so a panicking upload cannot poison `state`.
    upload_panics: AtomicBool,
}

impl FakeHost {
    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    pub fn seed_release(&self, tag: &str, assets: &[&str]) -> u64 {
        self.lock().insert(tag, Some("seeded"), Some("seeded notes"), assets)
    }

    pub fn release(&self, tag: &str) -> Option<Release> {
        self.lock()
            .releases
            .iter()
            .find(|release| release.tag_name == tag)
            .cloned()
    }

    pub fn fail_lookup(&self) {
        self.lock().lookup_fails = true;
    }

    pub fn fail_upload(&self) {
        self.lock().upload_fails = true;
    }

    pub fn panic_on_upload(&self) {
        self.upload_panics.store(true, Ordering::SeqCst);
    }

    pub fn fail_notes_update(&self) {
        self.lock().notes_fail = true;
    }

    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    /// Uploads that succeeded.
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.lock().uploads.clone()
    }

    pub fn upload_attempts(&self) -> usize {
        self.lock().upload_attempts
    }

    /// Every call that changes remote state, successful or not.
    pub fn writes(&self) -> usize {
        let state = self.lock();
        state.creates + state.notes_updates + state.upload_attempts
    }
}

#[async_trait]
impl ReleaseHost for FakeHost {
    async fn release_by_tag(&self, tag: &str) -> Result<ReleaseLookup, MirrorError> {
        let mut state = self.lock();
        state.lookups += 1;
        if state.lookup_fails {
            return Err(MirrorError::ReleaseApi(
                "lookup answered with status 401 Unauthorized".into(),
            ));
        }
        Ok(state
            .releases
            .iter()
            .find(|release| release.tag_name == tag)
            .cloned()
            .map_or(ReleaseLookup::NotFound, ReleaseLookup::Found))
    }

    async fn create_release(
        &self,
        tag: &str,
        title: &str,
        notes: &str,
    ) -> Result<Release, MirrorError> {
        let mut state = self.lock();
        state.creates += 1;
        let id = state.insert(tag, Some(title), Some(notes), &[]);
        Ok(state
            .releases
            .iter()
            .find(|release| release.id == id)
            .cloned()
            .expect("release was just inserted"))
    }

    async fn update_release_notes(&self, release_id: u64, notes: &str) -> Result<(), MirrorError> {
        let mut state = self.lock();
        state.notes_updates += 1;
        if state.notes_fail {
            return Err(MirrorError::ReleaseApi("update answered with status 422".into()));
        }
        let release = state
            .releases
            .iter_mut()
            .find(|release| release.id == release_id)
            .ok_or_else(|| MirrorError::ReleaseApi("update answered with status 404".into()))?;
        release.body = Some(notes.to_owned());
        Ok(())
    }

    async fn upload_asset(
        &self,
        release_id: u64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), MirrorError> {
        if self.upload_panics.load(Ordering::SeqCst) {
            panic!("upload of {filename} blew up");
        }
        let mut state = self.lock();
        state.upload_attempts += 1;
        if state.upload_fails {
            return Err(MirrorError::ReleaseApi("upload answered with status 502".into()));
        }
        let release = state
            .releases
            .iter_mut()
            .find(|release| release.id == release_id)
            .ok_or_else(|| MirrorError::ReleaseApi("upload answered with status 404".into()))?;
        release.assets.push(asset(&release.tag_name, filename));
        state.uploads.push(RecordedUpload {
            release_id,
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            bytes,
        });
        Ok(())
    }

    async fn latest_release(&self) -> Result<Option<Release>, MirrorError> {
        Ok(self.lock().releases.last().cloned())
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}
