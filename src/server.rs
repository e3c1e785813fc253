//! Web front end: the single-page upload form.
//!
//! | Route            | Purpose                                         |
//! |------------------|-------------------------------------------------|
//! | `GET /`          | the page, rendered from the session snapshot    |
//! | `POST /upload`   | multipart upload; starts one request, 303 → `/` |
//! | `GET /preview/{ticket}` | bytes of the current selection           |
//! | `GET /api/state` | the same snapshot as JSON                       |
//! | `GET /health`    | liveness                                        |
//!
//! There is one session per process. Each upload spawns its own task;
//! nothing is cancelled when a newer upload arrives. The session's
//! [`crate::config::OverwritePolicy`] decides which completion is shown.

use crate::config::ServerConfig;
use crate::error::{NeuralMathError, SolveError};
use crate::pipeline::ingest::{ingest_data_uri, ingest_upload, SelectedImage};
use crate::pipeline::llm::{solve_image, Solver};
use crate::render::render_page;
use crate::session::{Session, SessionView, Ticket};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Name of the multipart field carrying the file.
pub const UPLOAD_FIELD: &str = "image";

/// Shared state behind every handler.
pub struct AppState {
    session: Mutex<Session>,
    solver: Arc<dyn Solver>,
    instruction: String,
    refresh_secs: u32,
}

impl AppState {
    pub fn new(
        solver: Arc<dyn Solver>,
        instruction: impl Into<String>,
        config: &ServerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(Session::new(config.policy)),
            solver,
            instruction: instruction.into(),
            refresh_secs: config.refresh_secs,
        })
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> SessionView {
        self.session().view()
    }

    /// Select `image` and start its request in the background.
    ///
    /// The preview is visible as soon as this returns; the result slot is
    /// written when the spawned task completes.
    pub fn submit(self: &Arc<Self>, image: SelectedImage) -> (Ticket, JoinHandle<bool>) {
        let ticket = self.session().select(image.clone());
        let state = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = solve_image(state.solver.as_ref(), &image, &state.instruction).await;
            state.session().complete(ticket, outcome)
        });
        (ticket, handle)
    }

    /// Content type and bytes of the selection issued `ticket`, while it is
    /// still the current one.
    pub fn preview(&self, ticket: Ticket) -> Option<(String, Vec<u8>)> {
        self.session()
            .image_for(ticket)
            .map(|img| (img.preview_content_type().to_string(), img.bytes.clone()))
    }

    /// Record a selection whose contents could not be read.
    pub fn fail_selection(&self, error: SolveError) -> Ticket {
        self.session().fail_selection(error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("No preview for selection {0}")]
    PreviewNotFound(u64),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            AppError::PreviewNotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the router; exposed separately from [`serve`] for tests.
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/upload", post(upload_handler))
        .route("/preview/{ticket}", get(preview_handler))
        .route("/api/state", get(state_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C / SIGTERM.
pub async fn serve(
    config: ServerConfig,
    solver: Arc<dyn Solver>,
    instruction: impl Into<String>,
) -> Result<(), NeuralMathError> {
    let state = AppState::new(solver, instruction, &config);
    let app = router(state, config.max_upload_bytes);

    let address = config.bind.to_string();
    info!("Binding to {address}");
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| NeuralMathError::Bind {
            addr: address.clone(),
            source,
        })?;
    info!("NeuralMath running on http://{address} (policy: {})", config.policy);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| NeuralMathError::Internal(format!("server error: {e}")))?;

    info!("Server shut down");
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_page(&state.view(), state.refresh_secs))
}

async fn state_handler(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.view())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Path(ticket): Path<u64>,
) -> Result<Response, AppError> {
    let (content_type, bytes) = state
        .preview(Ticket(ticket))
        .ok_or(AppError::PreviewNotFound(ticket))?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        bytes,
    )
        .into_response())
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                warn!("Upload rejected: {}", e.body_text());
                state.fail_selection(SolveError::ReadFailure {
                    name: String::new(),
                    detail: e.body_text(),
                });
                break;
            }
            Err(e) => return Err(AppError::MalformedUpload(e.body_text())),
        };

        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let name = file_name.clone().unwrap_or_default();

        match field.bytes().await {
            Ok(bytes) => {
                // A plain text field holding a data URI rather than a file part.
                let selected = if file_name.is_none() && bytes.starts_with(b"data:") {
                    ingest_data_uri(None, &String::from_utf8_lossy(&bytes))
                } else {
                    Ok(ingest_upload(
                        file_name.as_deref(),
                        content_type.as_deref(),
                        bytes.to_vec(),
                    ))
                };
                match selected {
                    Ok(Some(image)) => {
                        let (ticket, _) = state.submit(image);
                        debug!("Upload '{}' started ticket {}", name, ticket.0);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        state.fail_selection(e);
                    }
                }
            }
            Err(e) => {
                warn!("Could not read upload '{}': {}", name, e.body_text());
                state.fail_selection(SolveError::ReadFailure {
                    name,
                    detail: e.body_text(),
                });
            }
        }
        break;
    }

    Ok(Redirect::to("/"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
