//! Service layer shared by the HTTP surface and the CLI.

mod rag;
mod types;

use async_trait::async_trait;

use crate::{
    catalog::DocumentEntry,
    ingestion::{DocumentUpload, IngestOutcome},
    metrics::MetricsSnapshot,
    providers::Credentials,
};

pub use rag::{BootstrapError, RagService, ServiceParts};
pub use types::{
    ChatRequest, ChatResponse, DeleteOutcome, HealthReport, ResetAllOutcome, ResetOutcome,
    ServiceError,
};

/// Abstraction over the pipeline used by external surfaces.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Chunk, embed, and index an extracted document for `owner_id`.
    async fn ingest(
        &self,
        owner_id: &str,
        upload: DocumentUpload,
    ) -> Result<IngestOutcome, ServiceError>;

    /// Documents of `owner_id`, newest first.
    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentEntry>, ServiceError>;

    /// Answer `request` from the caller's own documents, or refuse.
    async fn answer(
        &self,
        owner_id: &str,
        request: ChatRequest,
        credentials: Credentials,
    ) -> Result<ChatResponse, ServiceError>;

    /// Remove one document and its records. Idempotent.
    async fn delete_document(
        &self,
        owner_id: &str,
        document_id: &str,
    ) -> Result<DeleteOutcome, ServiceError>;

    /// Remove every record and catalog entry of `owner_id`.
    async fn reset_owner(&self, owner_id: &str) -> Result<ResetOutcome, ServiceError>;

    /// Drop the whole index, catalog, and conversation history.
    async fn reset_all(&self) -> Result<ResetAllOutcome, ServiceError>;

    /// Probe index reachability.
    async fn health(&self) -> HealthReport;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}
