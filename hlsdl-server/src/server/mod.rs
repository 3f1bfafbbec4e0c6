//! HTTP front-end: task submission, HTML pages and progress streams.

mod pages;
mod routes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use hlsdl_engine::DownloaderConfig;
use hlsdl_engine::hls::{DownloadCoordinator, HlsConfig, HlsTransferConfig, RequestHeaders};
use hlsdl_engine::output::{
    OutputTarget, OverwritePolicy, STDOUT_PATH, default_output_name, open_output,
    resolve_output_path,
};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppError;
use crate::task::{PendingTask, Task};

/// Settings shared by every download the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub output_dir: PathBuf,
    pub overwrite: OverwritePolicy,
    /// Remux program; `None` writes the raw stream.
    pub remux_program: Option<String>,
    pub downloader: DownloaderConfig,
    pub transfer: HlsTransferConfig,
}

/// A submitted download.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub url: String,
    pub filename: String,
    pub source: String,
    pub headers: RequestHeaders,
}

#[derive(Clone)]
pub struct AppContext {
    /// Task ids are indexes into this list
    pub tasks: Arc<RwLock<Vec<Arc<Task>>>>,
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server stops; running downloads are cancelled with it.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(Vec::new())),
            config: Arc::new(config),
            shutdown,
        }
    }

    pub fn task(&self, id: usize) -> Option<Arc<Task>> {
        self.tasks.read().get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks.read().clone()
    }

    /// Opens the output, starts the download and registers it.
    ///
    /// Returns the id of the new task.
    pub async fn start_task(&self, request: TaskRequest) -> Result<usize, AppError> {
        let coordinator = DownloadCoordinator::new(HlsConfig {
            base: self.config.downloader.clone(),
            transfer_config: self.config.transfer.clone(),
            request_headers: request.headers,
        })?;

        let requested = self.config.output_dir.join(output_file_name(&request.filename));
        let target = resolve_output_path(&requested.to_string_lossy(), self.config.overwrite)?;
        let filename = match &target {
            OutputTarget::File { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            OutputTarget::Stdout => STDOUT_PATH.to_string(),
        };
        let sink = open_output(&target, self.config.remux_program.as_deref()).await?;

        let cancel = coordinator.cancellation_token();
        let (progress, handle) = coordinator.start(&request.url, sink).await?;

        let pending = PendingTask {
            filename,
            url: request.url,
            source: request.source,
            cancel,
            progress,
            handle,
        };
        let mut tasks = self.tasks.write();
        let id = tasks.len();
        info!(id, url = %pending.url, filename = %pending.filename, "Task added");
        tasks.push(Arc::new(pending.spawn(id, self.shutdown.clone())));
        Ok(id)
    }
}

/// File name part of a submitted name; directories are dropped.
fn output_file_name(requested: &str) -> String {
    match Path::new(requested.trim()).file_name() {
        Some(name) if name != STDOUT_PATH => name.to_string_lossy().into_owned(),
        _ => default_output_name(),
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(routes::index_handler))
        .route("/add", get(routes::add_handler))
        .route("/{task}/", get(routes::task_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
