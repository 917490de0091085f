//! In-process fake separation services for provider tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::storage::{FileStorage, LocalStorage};

#[derive(Debug, Clone, Copy)]
pub(crate) enum JobOutcome {
    Completed,
    Failed,
}

pub(crate) struct FakeState {
    base_url: String,
    healthy: AtomicBool,
    separate_status: AtomicU16,
    omitted: Mutex<Vec<String>>,
    failing_downloads: Mutex<Vec<String>>,
    fields: Mutex<Vec<String>>,
    pending_polls: AtomicU32,
    outcome: Mutex<JobOutcome>,
    polls: AtomicU32,
}

impl FakeState {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            healthy: AtomicBool::new(true),
            separate_status: AtomicU16::new(200),
            omitted: Mutex::new(Vec::new()),
            failing_downloads: Mutex::new(Vec::new()),
            fields: Mutex::new(Vec::new()),
            pending_polls: AtomicU32::new(0),
            outcome: Mutex::new(JobOutcome::Completed),
            polls: AtomicU32::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Status returned by the separate and community endpoints
    pub fn set_separate_status(&self, status: u16) {
        self.separate_status.store(status, Ordering::SeqCst);
    }

    /// Leave a backend track name out of separation responses
    pub fn omit_track(&self, name: &str) {
        self.omitted.lock().unwrap().push(name.to_string());
    }

    /// Answer 404 when this backend stem is downloaded
    pub fn fail_download(&self, name: &str) {
        self.failing_downloads.lock().unwrap().push(name.to_string());
    }

    /// Multipart field names received so far, across all uploads
    pub fn upload_fields(&self) -> Vec<String> {
        self.fields.lock().unwrap().clone()
    }

    /// Report "processing" for `pending` polls, then `outcome`
    pub fn set_job(&self, pending: u32, outcome: JobOutcome) {
        self.pending_polls.store(pending, Ordering::SeqCst);
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    fn is_omitted(&self, name: &str) -> bool {
        self.omitted.lock().unwrap().iter().any(|n| n == name)
    }

    fn separate_status(&self) -> StatusCode {
        StatusCode::from_u16(self.separate_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

type Shared = Arc<FakeState>;

async fn record_fields(state: &FakeState, mut multipart: Multipart) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let _ = field.bytes().await;
        state.fields.lock().unwrap().push(name);
    }
}

async fn health(State(state): State<Shared>) -> StatusCode {
    if state.healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn separate(State(state): State<Shared>, multipart: Multipart) -> Response {
    record_fields(&state, multipart).await;
    let status = state.separate_status();
    if status != StatusCode::OK {
        return (status, Json(json!({ "error": "model crashed" }))).into_response();
    }

    let tracks: serde_json::Map<String, serde_json::Value> =
        ["vocals", "drums", "bass", "other", "accompaniment"]
            .into_iter()
            .filter(|name| !state.is_omitted(name))
            .map(|name| (name.to_string(), json!(format!("id-{}", name))))
            .collect();
    Json(json!({ "tracks": tracks })).into_response()
}

async fn download(
    State(state): State<Shared>,
    UrlPath((stem, id)): UrlPath<(String, String)>,
) -> Response {
    if state.failing_downloads.lock().unwrap().contains(&stem) {
        return StatusCode::NOT_FOUND.into_response();
    }
    format!("stem:{}:{}", stem, id).into_response()
}

async fn community(State(state): State<Shared>, multipart: Multipart) -> Response {
    record_fields(&state, multipart).await;
    let status = state.separate_status();
    if status != StatusCode::OK {
        return status.into_response();
    }

    let mut body = serde_json::Map::new();
    for name in ["vocals", "accompaniment"] {
        if !state.is_omitted(name) {
            body.insert(
                format!("{}_url", name),
                json!(format!("{}/files/{}.mp3", state.base_url, name)),
            );
        }
    }
    Json(body).into_response()
}

async fn upload(State(state): State<Shared>, multipart: Multipart) -> Response {
    record_fields(&state, multipart).await;
    Json(json!({ "id": "job-1" })).into_response()
}

async fn job_status(State(state): State<Shared>, UrlPath(_id): UrlPath<String>) -> Response {
    let polls = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
    if polls <= state.pending_polls.load(Ordering::SeqCst) {
        return Json(json!({ "status": "processing" })).into_response();
    }
    let outcome = *state.outcome.lock().unwrap();
    match outcome {
        JobOutcome::Completed => Json(json!({
            "status": "completed",
            "vocals_url": format!("{}/files/vocals.wav", state.base_url),
            "instrumental_url": format!("{}/files/instrumental.wav", state.base_url),
        }))
        .into_response(),
        JobOutcome::Failed => Json(json!({ "status": "failed" })).into_response(),
    }
}

async fn file(UrlPath(name): UrlPath<String>) -> String {
    format!("file:{}", name)
}

/// Fake backend serving every provider protocol on one local port
pub(crate) struct FakeBackend {
    pub base_url: String,
    pub state: Shared,
    server: tokio::task::JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(FakeState::new(base_url.clone()));

        let app = Router::new()
            .route("/health", get(health))
            .route("/separate", post(separate))
            .route("/download/:stem/:id", get(download))
            .route("/community", post(community))
            .route("/upload", post(upload))
            .route("/status/:id", get(job_status))
            .route("/files/:name", get(file))
            .with_state(Arc::clone(&state));

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url,
            state,
            server,
        }
    }

    /// Client that never routes localhost through an environment proxy
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    pub fn storage(&self) -> Arc<dyn FileStorage> {
        Arc::new(LocalStorage::new(self.client()))
    }

    /// Write a small source file into `dir`
    pub fn write_source(&self, dir: &Path) -> PathBuf {
        let path = dir.join("song.mp3");
        std::fs::write(&path, b"ID3 fake mp3 payload").unwrap();
        path
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
