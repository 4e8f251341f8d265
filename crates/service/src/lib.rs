//! HTTP front end: JSON endpoints over [`Workspace`] plus the embedded browser UI.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State};
use axum::http::{header, Method};
use axum::response::Html;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use storekeep_core::FileRecord;
use storekeep_gemini::UploadedDocument;
use storekeep_workflow::{AskOutcome, StoreListing, StoreSummary, UploadInput, Workspace};

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    workspace: Workspace,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(workspace: Workspace) -> Self {
        let upload_dir = workspace.config().upload_dir.clone();
        Self {
            workspace,
            upload_dir,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.workspace.config().max_upload_bytes;
    Router::new()
        .route("/", get(serve_ui))
        .route("/api/stores", get(list_stores).post(create_store))
        .route("/api/stores/:storeName", delete(delete_store))
        .route("/api/stores/:storeName/active", put(activate_store))
        .route("/api/stores/:storeName/files", get(list_files))
        .route("/api/files/upload", post(upload_file))
        .route("/api/ask", post(ask))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

async fn serve_ui() -> Html<&'static str> {
    Html(include_str!("../../../ui/index.html"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoreRequest {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    store_name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateStoreResponse {
    success: bool,
    store: StoreSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateStoreResponse {
    success: bool,
    message: String,
    active_store_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct FilesResponse {
    files: Vec<FileRecord>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    file: UploadedDocument,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    success: bool,
    #[serde(flatten)]
    outcome: AskOutcome,
}

async fn list_stores(State(state): State<Arc<AppState>>) -> Result<Json<StoreListing>, AppError> {
    Ok(Json(state.workspace.list_stores().await?))
}

async fn create_store(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<Json<CreateStoreResponse>, AppError> {
    let Json(body) = payload?;
    let display_name = body.display_name.unwrap_or_default();
    let store = state.workspace.create_store(&display_name).await?;
    Ok(Json(CreateStoreResponse {
        success: true,
        store,
    }))
}

async fn activate_store(
    State(state): State<Arc<AppState>>,
    AxumPath(store_name): AxumPath<String>,
) -> Result<Json<ActivateStoreResponse>, AppError> {
    let matched = state.workspace.activate_store(&store_name).await?;
    let response = if matched {
        ActivateStoreResponse {
            success: true,
            message: "store activated".to_string(),
            active_store_name: Some(store_name),
        }
    } else {
        ActivateStoreResponse {
            success: true,
            message: format!("{store_name} is not a known store; no store is active"),
            active_store_name: None,
        }
    };
    Ok(Json(response))
}

async fn delete_store(
    State(state): State<Arc<AppState>>,
    AxumPath(store_name): AxumPath<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.workspace.delete_store(&store_name).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "store deleted".to_string(),
    }))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    AxumPath(store_name): AxumPath<String>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = state.workspace.list_files(Some(&store_name)).await?;
    Ok(Json(FilesResponse { files }))
}

struct StagedUpload {
    file: NamedTempFile,
    original_name: Option<String>,
    content_type: Option<String>,
}

#[derive(Default)]
struct UploadForm {
    staged: Option<StagedUpload>,
    display_name: Option<String>,
    store_name: Option<String>,
}

/// Drains the multipart body, spooling the `file` field into `upload_dir`.
async fn read_upload_form(
    upload_dir: &Path,
    multipart: &mut Multipart,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let original_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                tokio::fs::create_dir_all(upload_dir)
                    .await
                    .map_err(AppError::internal)?;
                let file = NamedTempFile::new_in(upload_dir).map_err(AppError::internal)?;
                let handle = file.reopen().map_err(AppError::internal)?;
                let mut writer = tokio::fs::File::from_std(handle);
                while let Some(chunk) = field.chunk().await? {
                    writer.write_all(&chunk).await.map_err(AppError::internal)?;
                }
                writer.flush().await.map_err(AppError::internal)?;
                form.staged = Some(StagedUpload {
                    file,
                    original_name,
                    content_type,
                });
            }
            Some("displayName") => form.display_name = Some(field.text().await?),
            Some("storeName") => form.store_name = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_upload_form(&state.upload_dir, &mut multipart).await?;
    let staged = form
        .staged
        .ok_or_else(|| AppError::bad_request("file is required"))?;
    info!(
        original_name = staged.original_name.as_deref().unwrap_or("-"),
        staged = %staged.file.path().display(),
        "received upload"
    );
    let input = UploadInput {
        path: staged.file.path().to_path_buf(),
        store: form.store_name,
        display_name: form.display_name,
        original_name: staged.original_name,
        mime_type: staged.content_type,
    };
    // `staged.file` is dropped, and the spooled file removed, when this handler returns.
    let document = state.workspace.upload(input, None).await?;
    Ok(Json(UploadResponse {
        success: true,
        file: document,
    }))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(body) = payload?;
    let question = body.question.unwrap_or_default();
    let outcome = state
        .workspace
        .ask(&question, body.store_name.as_deref(), body.model.as_deref())
        .await?;
    Ok(Json(AskResponse {
        success: true,
        outcome,
    }))
}
