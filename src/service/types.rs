//! Request, response, and error types for the RAG service.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    catalog::CatalogError,
    conversation::SinkError,
    index::IndexError,
    ingestion::IngestError,
    providers::{DispatchError, StopSequences},
    retrieval::{RetrievalError, SourceRecord},
};

pub(crate) const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Errors surfaced by [`crate::service::RagService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request is malformed or incomplete.
    #[error("{0}")]
    Validation(String),
    /// Caller referenced documents it does not own.
    #[error("{0}")]
    Ownership(String),
    /// Referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Caller identity is missing or rejected.
    #[error("{0}")]
    Unauthorized(String),
    /// Provider selection, credentials, or the provider call failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Retrieval failed on embedding or index transport.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Ingestion failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Catalog failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Conversation sink failed.
    #[error(transparent)]
    Conversation(#[from] SinkError),
    /// Index maintenance failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ServiceError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Ownership(_) => "OWNERSHIP_ERROR",
            Self::NotFound(_) | Self::Conversation(SinkError::ConversationNotFound) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Dispatch(DispatchError::Upstream { .. }) => "UPSTREAM_ERROR",
            Self::Dispatch(DispatchError::Client(_)) => "INTERNAL_ERROR",
            Self::Dispatch(_) => "CONFIGURATION_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// HTTP status paired with [`ServiceError::code`].
    pub fn status(&self) -> StatusCode {
        match self.code() {
            "VALIDATION_ERROR" | "CONFIGURATION_ERROR" => StatusCode::BAD_REQUEST,
            "OWNERSHIP_ERROR" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body of a chat request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    /// Question text.
    pub query: String,
    /// Documents to ground the answer in.
    #[serde(default)]
    pub doc_ids: Vec<String>,
    /// Hits requested from the index.
    #[serde(default)]
    pub top_k: Option<i64>,
    /// Unique passages kept for the prompt.
    #[serde(default)]
    pub max_context: Option<i64>,
    /// Sampling temperature, `0.2` when omitted.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling bound.
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Option<StopSequences>,
    /// Maximum output tokens.
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Hosted backend wire shape override.
    #[serde(default)]
    pub use_responses_api: Option<bool>,
    /// Provider override.
    #[serde(default)]
    pub provider: Option<String>,
    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
    /// Existing conversation to append to.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Reply to a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Answer text, or the fixed refusal.
    pub response: String,
    /// Sources aligned with the citation numbers.
    pub sources: Vec<SourceRecord>,
    /// Conversation the exchange was recorded in.
    pub conversation_id: String,
    /// True when the reply is the fixed refusal.
    pub refused: bool,
}

/// Result of deleting one document.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    /// Always `deleted`.
    pub status: &'static str,
    /// Records removed, from the counts before and after.
    pub approx_chunks_deleted: usize,
    /// Records still matching; `None` when the index could not be counted.
    pub remaining: Option<usize>,
    /// Deletion confirmed by a zero count.
    pub verified: bool,
}

/// Result of resetting one owner.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    /// Always `reset`.
    pub status: &'static str,
    /// Records removed, from the counts before and after.
    pub approx_chunks_deleted: usize,
    /// Catalog entries removed.
    pub documents_removed: usize,
    /// Records still matching; `None` when unknown.
    pub remaining: Option<usize>,
    /// Deletion confirmed by a zero count.
    pub verified: bool,
}

/// Result of the privileged full reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetAllOutcome {
    /// Always `ok`.
    pub status: &'static str,
    /// Catalog entries removed.
    pub documents_removed: usize,
    /// Conversations removed.
    pub conversations_removed: usize,
}

/// Reachability summary for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// True when the index answered its probe.
    pub ok: bool,
    /// Active index backend.
    pub vector_backend: &'static str,
    /// Probe failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
    /// Provider names accepted by chat.
    pub providers_supported: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    #[test]
    fn errors_map_to_codes_and_statuses() {
        let cases = [
            (ServiceError::Validation("x".into()), "VALIDATION_ERROR", 400),
            (ServiceError::Ownership("x".into()), "OWNERSHIP_ERROR", 403),
            (ServiceError::NotFound("x".into()), "NOT_FOUND", 404),
            (ServiceError::Unauthorized("x".into()), "UNAUTHORIZED", 401),
            (
                ServiceError::Dispatch(DispatchError::UnsupportedProvider("x".into())),
                "CONFIGURATION_ERROR",
                400,
            ),
            (
                ServiceError::Dispatch(DispatchError::MissingCredential),
                "CONFIGURATION_ERROR",
                400,
            ),
            (
                ServiceError::Dispatch(DispatchError::Client("tls backend".into())),
                "INTERNAL_ERROR",
                500,
            ),
            (
                ServiceError::Dispatch(DispatchError::Upstream {
                    provider: ProviderKind::Ollama,
                    message: "down".into(),
                }),
                "UPSTREAM_ERROR",
                502,
            ),
            (
                ServiceError::Conversation(SinkError::ConversationNotFound),
                "NOT_FOUND",
                404,
            ),
            (
                ServiceError::Retrieval(RetrievalError::EmptyEmbedding),
                "INTERNAL_ERROR",
                500,
            ),
        ];
        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status().as_u16(), status);
        }
    }

    #[test]
    fn chat_request_accepts_minimal_body() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"query":"q","doc_ids":["d1"],"stop":"END"}"#).expect("json");
        assert_eq!(request.doc_ids, vec!["d1"]);
        assert!(request.top_k.is_none());
        assert_eq!(request.stop, Some(StopSequences::One("END".into())));
    }
}
