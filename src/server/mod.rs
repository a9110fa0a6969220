//! HTTP trigger surface.
//!
//! `GET /api/update` runs the mirror behind a bearer secret, `GET /api/latest`
//! redirects to the newest mirrored launcher and `GET /api/status` reports the
//! last background publish.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::state::RunOutcome;
use crate::engine::{Mirror, PendingPublish, Prepared, authorize};
use crate::env::Config;
use crate::error::MirrorError;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub secret: Option<String>,
    pub background: bool,
}

impl TriggerSettings {
    pub fn from_config(config: &Config, background: bool) -> Self {
        if config.trigger_secret.is_none() {
            warn!("server: CRON_SECRET is not set, triggers will answer with a configuration error");
        }
        Self {
            secret: config.trigger_secret.clone(),
            background,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublishStatus {
    Idle,
    Running {
        tag: String,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        tag: String,
        outcome: RunOutcome,
        finished_at: DateTime<Utc>,
    },
    Failed {
        tag: String,
        error: String,
        message: String,
        finished_at: DateTime<Utc>,
    },
}

/// Runs background publishes one at a time and records how each one ended.
#[derive(Clone)]
pub struct PublishMonitor {
    status: Arc<watch::Sender<PublishStatus>>,
}

impl Default for PublishMonitor {
    fn default() -> Self {
        let (status, _) = watch::channel(PublishStatus::Idle);
        Self {
            status: Arc::new(status),
        }
    }
}

impl PublishMonitor {
    pub fn current(&self) -> PublishStatus {
        self.status.borrow().clone()
    }

    /// Start publishing `pending`.
    ///
    /// Fails with the tag of the running publish when one is already in flight.
    pub fn spawn(&self, mirror: Arc<Mirror>, pending: PendingPublish) -> Result<(), String> {
        let tag = pending.release.tag.clone();
        let mut running = None;
        let started = self.status.send_if_modified(|status| {
            if let PublishStatus::Running { tag: current, .. } = status {
                running = Some(current.clone());
                return false;
            }
            *status = PublishStatus::Running {
                tag: tag.clone(),
                started_at: Utc::now(),
            };
            true
        });
        if !started {
            let running = running.unwrap_or_default();
            info!("server: publish of {running} still running, not starting {tag}");
            return Err(running);
        }

        let task = tokio::spawn(async move { mirror.publish(pending).await });
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            let joined = task.await;
            let finished_at = Utc::now();
            let next = match joined {
                Ok(Ok(outcome)) => {
                    info!("server: background publish of {tag} finished");
                    PublishStatus::Succeeded {
                        tag,
                        outcome,
                        finished_at,
                    }
                }
                Ok(Err(err)) => {
                    error!("server: background publish of {tag} failed: {err}");
                    PublishStatus::Failed {
                        tag,
                        error: err.kind().to_owned(),
                        message: err.to_string(),
                        finished_at,
                    }
                }
                Err(err) => {
                    error!("server: background publish of {tag} did not finish: {err}");
                    let kind = if err.is_panic() {
                        "publish_panicked"
                    } else {
                        "publish_cancelled"
                    };
                    PublishStatus::Failed {
                        tag,
                        error: kind.to_owned(),
                        message: err.to_string(),
                        finished_at,
                    }
                }
            };
            status.send_replace(next);
        });
        Ok(())
    }
}

pub struct AppState {
    settings: TriggerSettings,
    // Kept as the load error so every trigger can report it.
    mirror: Result<Arc<Mirror>, String>,
    monitor: PublishMonitor,
}

impl AppState {
    pub fn new(settings: TriggerSettings, mirror: Result<Mirror, MirrorError>) -> Self {
        let mirror = mirror.map(Arc::new).map_err(|err| match err {
            MirrorError::Configuration(message) => message,
            other => other.to_string(),
        });
        Self {
            settings,
            mirror,
            monitor: PublishMonitor::default(),
        }
    }

    /// Wire a long-lived mirror from the loaded configuration.
    pub fn from_config(config: Result<Config, MirrorError>, background: bool) -> Self {
        match config {
            Ok(config) => Self::new(
                TriggerSettings::from_config(&config, background),
                Ok(Mirror::from_config(&config, true)),
            ),
            Err(err) => {
                error!("server: {err}; triggers will answer with a configuration error");
                Self::new(
                    TriggerSettings {
                        secret: None,
                        background,
                    },
                    Err(err),
                )
            }
        }
    }

    fn mirror(&self) -> Result<Arc<Mirror>, MirrorError> {
        self.mirror
            .as_ref()
            .map(Arc::clone)
            .map_err(|message| MirrorError::Configuration(message.clone()))
    }

    /// Configuration first, then the shared secret.
    fn authorized_mirror(&self, headers: &HeaderMap) -> Result<Arc<Mirror>, MirrorError> {
        let mirror = self.mirror()?;
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        authorize(header, self.settings.secret.as_deref().unwrap_or_default())?;
        Ok(mirror)
    }
}

#[derive(Serialize)]
struct TriggerResponse {
    status: &'static str,
    tag: String,
    asset: String,
    client_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    running: Option<String>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/update", get(update_handler))
        .route("/api/latest", get(latest_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
}

pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| format!("failed to bind {bind}: {e}"))?;
    info!("server: listening on {bind}");
    axum::serve(listener, create_router(state))
        .await
        .map_err(|e| format!("server error: {e}"))
}

fn outcome_response(outcome: RunOutcome) -> Response {
    let status = match outcome {
        RunOutcome::UpToDate { .. } => StatusCode::OK,
        RunOutcome::Published { .. } => StatusCode::CREATED,
    };
    (status, Json(outcome)).into_response()
}

async fn update_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mirror = match state.authorized_mirror(&headers) {
        Ok(mirror) => mirror,
        Err(err) => return err.into_response(),
    };

    if !state.settings.background {
        return match mirror.run().await {
            Ok(outcome) => outcome_response(outcome),
            Err(err) => err.into_response(),
        };
    }

    match mirror.prepare().await {
        Ok(Prepared::Done(outcome)) => outcome_response(outcome),
        Ok(Prepared::Pending(pending)) => {
            let mut body = TriggerResponse {
                status: "accepted",
                tag: pending.release.tag.clone(),
                asset: pending.filename.clone(),
                client_version: pending.versions.client_version.clone(),
                running: None,
            };
            match state.monitor.spawn(mirror, pending) {
                Ok(()) => (StatusCode::ACCEPTED, Json(body)).into_response(),
                // The running publish already covers this tag.
                Err(running) if running == body.tag => {
                    (StatusCode::ACCEPTED, Json(body)).into_response()
                }
                Err(running) => {
                    body.status = "already_running";
                    body.running = Some(running);
                    (StatusCode::CONFLICT, Json(body)).into_response()
                }
            }
        }
        Err(err) => err.into_response(),
    }
}

async fn latest_handler(State(state): State<Arc<AppState>>) -> Response {
    let mirror = match state.mirror() {
        Ok(mirror) => mirror,
        Err(err) => return err.into_response(),
    };
    match mirror.latest_asset_url().await {
        Ok(Some(url)) => Redirect::temporary(&url).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<PublishStatus> {
    Json(state.monitor.current())
}
