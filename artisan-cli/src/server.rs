use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use artisan_core::{
    generate_website, AssetError, AssetStore, BridgeReceiver, BridgeSender, Command, DevicePreset,
    Document, DocumentError, GenerationError, SiteGenerator, Theme, ViewEvent, Workbench,
};
use artisan_render::{export_zip_bytes, frame_style, render_host_page, HostPage, DEFAULT_ARCHIVE_NAME};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::project::Project;

const LONG_POLL: Duration = Duration::from_secs(25);
const WATCH_DEBOUNCE: Duration = Duration::from_millis(150);
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Everything the HTTP handlers, the bridge consumer and the console share.
pub struct AppState {
    workbench: Arc<Mutex<Workbench>>,
    events: Arc<Mutex<Vec<ViewEvent>>>,
    bridge: BridgeSender,
    assets: Arc<dyn AssetStore>,
    generator: Arc<dyn SiteGenerator>,
    version: watch::Sender<u64>,
    project_path: Option<PathBuf>,
    origin: String,
}

/// Snapshot returned by `/api/state` and `/api/wait`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateView {
    pub version: u64,
    pub revision: String,
    pub active: String,
    pub active_index: usize,
    pub pages: Vec<String>,
    pub device: DevicePreset,
    pub theme: Theme,
    pub frame_style: String,
}

impl AppState {
    pub fn new(
        workbench: Workbench,
        assets: Arc<dyn AssetStore>,
        generator: Arc<dyn SiteGenerator>,
        project_path: Option<PathBuf>,
        origin: impl Into<String>,
    ) -> (Arc<Self>, BridgeReceiver) {
        let (bridge, receiver) = artisan_core::navigation_bridge();
        let events = workbench.events();
        let (version, _) = watch::channel(0);
        let state = Arc::new(Self {
            workbench: Arc::new(Mutex::new(workbench)),
            events,
            bridge,
            assets,
            generator,
            version,
            project_path,
            origin: origin.into(),
        });
        (state, receiver)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn bridge(&self) -> &BridgeSender {
        &self.bridge
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn document(&self) -> Document {
        self.workbench.lock().document().clone()
    }

    pub fn state_view(&self) -> StateView {
        let workbench = self.workbench.lock();
        StateView {
            version: self.version(),
            revision: workbench.revision().to_string(),
            active: workbench.active_page().filename.clone(),
            active_index: workbench.active_index(),
            pages: workbench
                .document()
                .pages()
                .iter()
                .map(|page| page.filename.clone())
                .collect(),
            device: workbench.device(),
            theme: workbench.theme(),
            frame_style: frame_style(workbench.device()),
        }
    }

    pub fn render_preview(&self) -> Result<String> {
        self.workbench.lock().render()
    }

    /// Drains queued view events and bumps the version when there were any.
    pub fn publish(&self) -> u64 {
        let drained = std::mem::take(&mut *self.events.lock());
        if drained.is_empty() {
            return self.version();
        }
        for event in &drained {
            debug!(?event, "view event");
        }
        self.version.send_modify(|version| *version += 1);
        self.version()
    }

    pub fn apply(&self, command: Command) -> Result<()> {
        let result = self.workbench.lock().apply(command);
        self.publish();
        result
    }

    fn install(&self, theme: Theme, document: Document) {
        {
            let mut workbench = self.workbench.lock();
            workbench.replace_document(document);
            if let Err(err) = workbench.apply(Command::SetTheme { theme }) {
                warn!(error = %err, "failed to set theme");
            }
        }
        self.publish();
    }

    /// Writes the current document to the project file, if there is one.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.project_path else {
            return Ok(());
        };
        let project = {
            let workbench = self.workbench.lock();
            Project {
                theme: workbench.theme(),
                document: workbench.document().clone(),
            }
        };
        project.save(path)
    }

    /// Loads the project file again. Returns whether the displayed document
    /// changed; an identical file leaves the active page alone.
    pub fn reload_project(&self) -> Result<bool> {
        let path = self
            .project_path
            .as_ref()
            .ok_or_else(|| anyhow!("no project file configured"))?;
        let project = Project::load(path)?;
        {
            let workbench = self.workbench.lock();
            if workbench.document() == &project.document && workbench.theme() == project.theme {
                return Ok(false);
            }
        }
        self.install(project.theme, project.document);
        Ok(true)
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::BadGateway(msg) => {
                msg.clone()
            }
            ApiError::Internal(err) => format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!(error = ?err, "request failed");
        }
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            err @ AssetError::InvalidFilename(_) => ApiError::BadRequest(err.to_string()),
            err @ AssetError::NotFound(_) => ApiError::NotFound(err.to_string()),
            err @ AssetError::Io { .. } => ApiError::Internal(err.into()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::PromptTooShort => ApiError::BadRequest(err.to_string()),
            GenerationError::Failed(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/preview", get(preview))
        .route("/api/state", get(current_state))
        .route("/api/wait", get(wait_for_change))
        .route("/api/navigate", post(navigate))
        .route("/api/device/{preset}", post(set_device))
        .route("/api/files/{filename}", put(edit_file))
        .route("/api/generate", post(generate))
        .route("/api/assets", get(list_assets))
        .route("/api/assets/{name}", post(upload_asset).delete(delete_asset))
        .route("/assets/{*path}", get(serve_asset))
        .route("/export.zip", get(export_archive))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Runs the host server on an already bound listener until `shutdown` fires
/// or the process gets Ctrl-C.
pub async fn serve(
    state: Arc<AppState>,
    receiver: BridgeReceiver,
    listener: TcpListener,
    watch: bool,
    shutdown: Arc<Notify>,
) -> Result<()> {
    spawn_bridge_consumer(Arc::clone(&state), receiver);

    if watch {
        match state.project_path.clone() {
            Some(path) => {
                tokio::spawn(watch_project(Arc::clone(&state), path));
            }
            None => warn!("--watch needs a project file; not watching"),
        }
    }

    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, origin = %state.origin, "serving preview");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "failed to listen for ctrl-c");
                    }
                }
            }
        })
        .await
        .context("server failed")?;
    info!("server stopped");
    Ok(())
}

/// The one task that applies navigation messages, in the order they arrive.
pub fn spawn_bridge_consumer(state: Arc<AppState>, mut receiver: BridgeReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            state.workbench.lock().handle_message(message);
            state.publish();
        }
        debug!("bridge consumer finished");
    })
}

async fn watch_project(state: Arc<AppState>, path: PathBuf) {
    let (_watcher, mut rx) = match start_project_watcher(&path) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "project watcher unavailable");
            return;
        }
    };
    info!(path = %path.display(), "watching project file");

    while rx.recv().await.is_some() {
        debounce(&mut rx).await;
        match state.reload_project() {
            Ok(true) => info!(path = %path.display(), "project reloaded"),
            Ok(false) => debug!("project file unchanged"),
            Err(err) => warn!(error = %format!("{err:#}"), "failed to reload project"),
        }
    }
}

async fn debounce(rx: &mut mpsc::UnboundedReceiver<()>) {
    let sleep = tokio::time::sleep_until(Instant::now() + WATCH_DEBOUNCE);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            maybe = rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                sleep.as_mut().reset(Instant::now() + WATCH_DEBOUNCE);
            }
        }
    }
}

fn start_project_watcher(
    path: &FsPath,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| FsPath::new("."));
    let file_name = path.file_name().map(|name| name.to_os_string());
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref())
                {
                    let _ = tx.send(());
                }
            }
            Err(err) => warn!(error = %err, "watch error"),
        }
    })
    .context("failed to initialise file watcher")?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {:?}", dir))?;
    Ok((watcher, rx))
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let view = state.state_view();
    Html(render_host_page(&HostPage {
        device: view.device,
        theme: view.theme,
        version: view.version,
        ..HostPage::default()
    }))
}

async fn preview(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    Ok(Html(state.render_preview()?))
}

async fn current_state(State(state): State<Arc<AppState>>) -> Json<StateView> {
    Json(state.state_view())
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    since: u64,
}

async fn wait_for_change(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WaitQuery>,
) -> Json<StateView> {
    let mut rx = state.version.subscribe();
    let current = *rx.borrow_and_update();
    if current == query.since {
        let _ = tokio::time::timeout(LONG_POLL, rx.changed()).await;
    }
    Json(state.state_view())
}

/// Relays a frame message onto the bridge. Anything that isn't a navigate
/// message is dropped; the caller never learns the outcome.
async fn navigate(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => {
            state.bridge().post_value(&value);
        }
        Err(err) => debug!(error = %err, "ignoring malformed bridge message"),
    }
    StatusCode::ACCEPTED
}

async fn set_device(
    State(state): State<Arc<AppState>>,
    Path(preset): Path<String>,
) -> Result<Json<StateView>, ApiError> {
    let device: DevicePreset = preset
        .parse()
        .map_err(|err: anyhow::Error| ApiError::BadRequest(err.to_string()))?;
    state.apply(Command::SetDevice { device })?;
    Ok(Json(state.state_view()))
}

#[instrument(skip(state, content))]
async fn edit_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    content: String,
) -> Result<Json<StateView>, ApiError> {
    state
        .apply(Command::EditFile { filename, content })
        .map_err(|err| match err.downcast_ref::<DocumentError>() {
            Some(doc_err @ DocumentError::UnknownPage(_)) => ApiError::NotFound(doc_err.to_string()),
            _ => ApiError::BadRequest(format!("{err:#}")),
        })?;
    if let Err(err) = state.persist() {
        warn!(error = %format!("{err:#}"), "failed to save project");
    }
    Ok(Json(state.state_view()))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub theme: Theme,
    pub pages: Vec<String>,
}

/// The body is parsed by hand so that malformed requests still get a JSON
/// error body.
async fn generate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerateRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid generate request: {err}")))?;
    let generation = generate_website(state.generator.as_ref(), &request.prompt).await?;
    let pages = generation
        .document
        .pages()
        .iter()
        .map(|page| page.filename.clone())
        .collect();
    let theme = generation.theme;
    state.install(theme, generation.document);
    if let Err(err) = state.persist() {
        warn!(error = %format!("{err:#}"), "failed to save project");
    }
    Ok(Json(GenerateResponse { theme, pages }))
}

async fn list_assets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.assets.list()?))
}

async fn upload_asset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let url = state.assets.upload(&name, &body)?;
    info!(%url, bytes = body.len(), "asset uploaded");
    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.assets.delete(&name)?;
    info!(%name, "asset deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn serve_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.assets.read(&path)?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response())
}

async fn export_archive(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bytes = export_zip_bytes(&state.document())?;
    let headers: [(HeaderName, String); 2] = [
        (header::CONTENT_TYPE, "application/zip".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DEFAULT_ARCHIVE_NAME}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = FsPath::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
