//! HTTP surface for Groundwork.
//!
//! Every `/v1` route identifies the caller through the `user-id` header:
//!
//! - `POST /v1/files` – Chunk, embed, and index pre-extracted text blobs for the caller.
//! - `GET /v1/files` – List the caller's documents, newest first.
//! - `DELETE /v1/files/:doc_id` – Verified delete of one document. Idempotent.
//! - `POST /v1/reset` – Remove every document of the caller.
//! - `POST /v1/chat` – Answer a question grounded in the selected documents, or refuse.
//!   Provider, model, and key may come from `X-LLM-Provider`, `X-LLM-Model`, `X-OpenAI-Key`.
//! - `POST /v1/admin/reset_all` – Drop everything; requires `X-Admin-Token`.
//! - `GET /health` – Index reachability and supported providers.
//! - `GET /metrics` – Pipeline counters.
//!
//! Failures share one body shape: `{"ok": false, "error": {"code", "message"}}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use serde_json::json;

use crate::{
    catalog::DocumentEntry,
    ingestion::{DocumentUpload, IngestOutcome},
    metrics::MetricsSnapshot,
    providers::Credentials,
    service::{
        ChatRequest, ChatResponse, DeleteOutcome, HealthReport, RagApi, ResetAllOutcome,
        ResetOutcome, ServiceError,
    },
};

const USER_HEADER: &str = "user-id";
const PROVIDER_HEADER: &str = "x-llm-provider";
const MODEL_HEADER: &str = "x-llm-model";
const OPENAI_KEY_HEADER: &str = "x-openai-key";
const ADMIN_HEADER: &str = "x-admin-token";

struct AppState<S> {
    service: Arc<S>,
    admin_token: Option<Arc<str>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

/// Build the HTTP router. The full-reset route is disabled when `admin_token` is `None`.
pub fn create_router<S>(service: Arc<S>, admin_token: Option<String>) -> Router
where
    S: RagApi + 'static,
{
    let state = AppState {
        service,
        admin_token: admin_token
            .filter(|token| !token.is_empty())
            .map(Arc::from),
    };
    Router::new()
        .route("/v1/files", post(upload_file::<S>).get(list_files::<S>))
        .route("/v1/files/:doc_id", delete(delete_file::<S>))
        .route("/v1/reset", post(reset_owner::<S>))
        .route("/v1/chat", post(chat::<S>))
        .route("/v1/admin/reset_all", post(reset_all::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(metrics::<S>))
        .with_state(state)
}

async fn upload_file<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: Result<Json<DocumentUpload>, JsonRejection>,
) -> Result<Json<IngestOutcome>, AppError>
where
    S: RagApi,
{
    let owner_id = owner_from(&headers)?;
    let Json(upload) = payload.map_err(reject)?;
    if upload.filename.trim().is_empty() {
        return Err(ServiceError::Validation("filename must not be empty.".into()).into());
    }
    let outcome = state.service.ingest(&owner_id, upload).await?;
    tracing::info!(
        owner = %owner_id,
        document = %outcome.document_id,
        chunks = outcome.chunks,
        "Upload request completed"
    );
    Ok(Json(outcome))
}

/// Response body for `GET /v1/files`.
#[derive(Serialize)]
struct FilesResponse {
    files: Vec<DocumentEntry>,
}

async fn list_files<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<FilesResponse>, AppError>
where
    S: RagApi,
{
    let owner_id = owner_from(&headers)?;
    let files = state.service.list_documents(&owner_id).await?;
    Ok(Json(FilesResponse { files }))
}

async fn delete_file<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
) -> Result<Json<DeleteOutcome>, AppError>
where
    S: RagApi,
{
    let owner_id = owner_from(&headers)?;
    let doc_id = doc_id.trim();
    if doc_id.is_empty() {
        return Err(ServiceError::Validation("doc_id must not be empty.".into()).into());
    }
    Ok(Json(state.service.delete_document(&owner_id, doc_id).await?))
}

async fn reset_owner<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<ResetOutcome>, AppError>
where
    S: RagApi,
{
    let owner_id = owner_from(&headers)?;
    Ok(Json(state.service.reset_owner(&owner_id).await?))
}

/// Answer a question. Body values win over the `X-LLM-*` headers.
async fn chat<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: RagApi,
{
    let owner_id = owner_from(&headers)?;
    let Json(mut request) = payload.map_err(reject)?;
    if request.provider.is_none() {
        request.provider = header_value(&headers, PROVIDER_HEADER);
    }
    if request.model.is_none() {
        request.model = header_value(&headers, MODEL_HEADER);
    }
    let credentials = Credentials {
        openai_api_key: header_value(&headers, OPENAI_KEY_HEADER),
    };

    let reply = state
        .service
        .answer(&owner_id, request, credentials)
        .await?;
    Ok(Json(reply))
}

async fn reset_all<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<ResetAllOutcome>, AppError>
where
    S: RagApi,
{
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ServiceError::Unauthorized("Admin reset is disabled.".into()).into());
    };
    match header_value(&headers, ADMIN_HEADER) {
        Some(provided) if tokens_match(&provided, expected) => {}
        _ => {
            tracing::warn!("Rejected admin reset with missing or wrong token");
            return Err(ServiceError::Unauthorized("Invalid admin token.".into()).into());
        }
    }
    Ok(Json(state.service.reset_all().await?))
}

/// Compares every byte of `expected` regardless of where the first mismatch falls.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
    let mut diff = provided.len() ^ expected.len();
    for (index, byte) in expected.iter().enumerate() {
        diff |= usize::from(byte ^ provided.get(index).copied().unwrap_or(0));
    }
    diff == 0
}

async fn health<S>(State(state): State<AppState<S>>) -> Json<HealthReport>
where
    S: RagApi,
{
    Json(state.service.health().await)
}

async fn metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(state.service.metrics_snapshot())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Caller identity; must be present and UUID-shaped.
fn owner_from(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = header_value(headers, USER_HEADER)
        .ok_or_else(|| ServiceError::Unauthorized("Missing user-id header.".into()))?;
    uuid::Uuid::parse_str(&raw)
        .map(|id| id.to_string())
        .map_err(|_| ServiceError::Validation("user-id header must be a UUID.".into()).into())
}

fn reject(rejection: JsonRejection) -> AppError {
    ServiceError::Validation(rejection.body_text()).into()
}

struct AppError(ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }
        let body = json!({
            "ok": false,
            "error": { "code": self.0.code(), "message": self.0.to_string() },
        });
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
