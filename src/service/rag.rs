//! Composition root for the grounded question-answering pipeline.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::{
    catalog::{DocumentCatalog, DocumentEntry, InMemoryCatalog},
    config::Config,
    conversation::{AuditRecord, AuditRole, ConversationSink, InMemoryConversationSink},
    embedding::{EmbeddingClientError, SharedEmbedder, build_embedding_client},
    index::{IndexError, TagFilter, VectorIndex, open_index},
    ingestion::{ChunkingError, DocumentUpload, IngestOutcome, IngestionService, TextChunker},
    metrics::{MetricsSnapshot, PipelineMetrics},
    prompt::{OOS_REPLY, PromptOptions, build_messages_with},
    providers::{
        Credentials, Dispatch, DispatchError, DispatchRequest, ProviderDispatcher,
        SUPPORTED_PROVIDERS, SamplingOptions,
    },
    retrieval::{RetrievalLimits, Retriever, SourceRecord},
};

use super::RagApi;
use super::types::{
    ChatRequest, ChatResponse, DEFAULT_TEMPERATURE, DeleteOutcome, HealthReport, ResetAllOutcome,
    ResetOutcome, ServiceError,
};

const NO_DOCUMENTS: &str = "No file selected. Provide one or more doc_ids to chat against.";
const FOREIGN_DOCUMENTS: &str = "One or more doc_ids do not belong to this user.";

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Chunker settings were rejected.
    #[error("invalid chunking configuration: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding client could not be built.
    #[error("embedding client unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index could not be opened.
    #[error("vector index unavailable: {0}")]
    Index(#[from] IndexError),
    /// Provider dispatcher could not be built.
    #[error("provider dispatcher unavailable: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Explicitly constructed collaborators of [`RagService`].
pub struct ServiceParts {
    /// Passage splitter.
    pub chunker: TextChunker,
    /// Shared embedding client.
    pub embedder: SharedEmbedder,
    /// Opened vector index.
    pub index: VectorIndex,
    /// Completion dispatcher.
    pub dispatcher: Arc<dyn Dispatch>,
    /// Document ownership catalog.
    pub catalog: Arc<dyn DocumentCatalog>,
    /// Conversation audit sink.
    pub conversations: Arc<dyn ConversationSink>,
}

/// Grounded document Q&A over one vector index.
pub struct RagService {
    ingestion: IngestionService,
    retriever: Retriever,
    dispatcher: Arc<dyn Dispatch>,
    index: VectorIndex,
    catalog: Arc<dyn DocumentCatalog>,
    conversations: Arc<dyn ConversationSink>,
    metrics: Arc<PipelineMetrics>,
    prompt_options: PromptOptions,
}

impl RagService {
    /// Assemble the service from its parts.
    pub fn new(parts: ServiceParts) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let ingestion = IngestionService::new(
            parts.chunker,
            parts.embedder.clone(),
            parts.index.clone(),
            parts.catalog.clone(),
            metrics.clone(),
        );
        Self {
            ingestion,
            retriever: Retriever::new(parts.embedder, parts.index.clone()),
            dispatcher: parts.dispatcher,
            index: parts.index,
            catalog: parts.catalog,
            conversations: parts.conversations,
            metrics,
            prompt_options: PromptOptions::default(),
        }
    }

    /// Build every collaborator from configuration and open the index.
    pub async fn from_config(config: &Config) -> Result<Self, BootstrapError> {
        let chunker = TextChunker::from_settings(&config.chunking)?;
        let embedder = build_embedding_client(&config.embedding)?;
        let index = open_index(
            config.vector_backend,
            &config.qdrant,
            config.embedding.dimension,
        )
        .await?;
        let dispatcher = ProviderDispatcher::new(config.llm.clone())?;

        Ok(Self::new(ServiceParts {
            chunker,
            embedder,
            index,
            dispatcher: Arc::new(dispatcher),
            catalog: Arc::new(InMemoryCatalog::new()),
            conversations: Arc::new(InMemoryConversationSink::new()),
        }))
    }

    /// Release the index handle at shutdown.
    pub fn close(self) {
        self.index.close();
    }

    async fn record_exchange(
        &self,
        conversation_id: &str,
        owner_id: &str,
        answer: &str,
        sources: &[SourceRecord],
    ) -> Result<(), ServiceError> {
        self.conversations
            .append(AuditRecord {
                conversation_id: conversation_id.to_string(),
                owner_id: owner_id.to_string(),
                role: AuditRole::Assistant,
                content: answer.to_string(),
                sources: sources.to_vec(),
                meta: json!({}),
            })
            .await?;
        Ok(())
    }
}

fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !unique.iter().any(|seen| seen == id) {
            unique.push(id.to_string());
        }
    }
    unique
}

#[async_trait::async_trait]
impl RagApi for RagService {
    async fn ingest(
        &self,
        owner_id: &str,
        upload: DocumentUpload,
    ) -> Result<IngestOutcome, ServiceError> {
        Ok(self.ingestion.ingest(owner_id, upload).await?)
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentEntry>, ServiceError> {
        Ok(self.catalog.list(owner_id).await?)
    }

    async fn answer(
        &self,
        owner_id: &str,
        request: ChatRequest,
        credentials: Credentials,
    ) -> Result<ChatResponse, ServiceError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ServiceError::Validation("Query must not be empty.".into()));
        }
        let doc_ids = unique_ids(&request.doc_ids);
        if doc_ids.is_empty() {
            return Err(ServiceError::Validation(NO_DOCUMENTS.into()));
        }

        let conversation_id = self
            .conversations
            .open(owner_id, request.conversation_id.as_deref(), query)
            .await?;
        let limits = RetrievalLimits::clamped(request.top_k, request.max_context);
        self.conversations
            .append(AuditRecord {
                conversation_id: conversation_id.clone(),
                owner_id: owner_id.to_string(),
                role: AuditRole::User,
                content: request.query.clone(),
                sources: Vec::new(),
                meta: json!({
                    "doc_ids": doc_ids,
                    "top_k": limits.top_k,
                    "max_context": limits.max_context,
                }),
            })
            .await?;

        let owned = self.catalog.owned_count(owner_id, &doc_ids).await?;
        if owned != doc_ids.len() {
            tracing::warn!(owner = owner_id, requested = doc_ids.len(), owned, "Rejected foreign doc_ids");
            return Err(ServiceError::Ownership(FOREIGN_DOCUMENTS.into()));
        }

        let context = self
            .retriever
            .retrieve(query, owner_id, &doc_ids, limits)
            .await?;

        if context.is_empty() {
            tracing::info!(owner = owner_id, conversation = %conversation_id, "No grounding found; refusing");
            self.record_exchange(&conversation_id, owner_id, OOS_REPLY, &[])
                .await?;
            self.metrics.record_answer(true);
            return Ok(ChatResponse {
                response: OOS_REPLY.to_string(),
                sources: Vec::new(),
                conversation_id,
                refused: true,
            });
        }

        let messages = build_messages_with(query, &context.items, self.prompt_options);
        let answer = self
            .dispatcher
            .dispatch(DispatchRequest {
                messages,
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                provider: request.provider,
                model: request.model,
                credentials,
                sampling: SamplingOptions {
                    top_p: request.top_p,
                    stop: request.stop,
                    max_output_tokens: request.max_output_tokens,
                    use_responses_api: request.use_responses_api,
                },
            })
            .await?;

        self.record_exchange(&conversation_id, owner_id, &answer, &context.sources)
            .await?;
        let refused = answer.trim() == OOS_REPLY;
        self.metrics.record_answer(refused);
        tracing::info!(
            owner = owner_id,
            conversation = %conversation_id,
            passages = context.items.len(),
            refused,
            "Answered question"
        );

        Ok(ChatResponse {
            response: answer,
            sources: context.sources,
            conversation_id,
            refused,
        })
    }

    async fn delete_document(
        &self,
        owner_id: &str,
        document_id: &str,
    ) -> Result<DeleteOutcome, ServiceError> {
        let filter = TagFilter::document(owner_id, document_id);
        let known = self
            .catalog
            .owned_count(owner_id, &[document_id.to_string()])
            .await?
            == 1;
        let before = if known {
            self.index.count_matching(&filter).await
        } else {
            None
        };

        let report = self.index.delete_matching(&filter).await;
        if !report.is_confirmed() {
            self.metrics.record_delete_residue();
        }
        if known {
            self.catalog.remove(owner_id, document_id).await?;
        }

        let approx_chunks_deleted = before
            .unwrap_or(0)
            .saturating_sub(report.remaining.unwrap_or(0));
        tracing::info!(
            owner = owner_id,
            document = document_id,
            known,
            approx_chunks_deleted,
            remaining = ?report.remaining,
            "Document deleted"
        );

        Ok(DeleteOutcome {
            status: "deleted",
            approx_chunks_deleted,
            remaining: report.remaining,
            verified: report.is_confirmed(),
        })
    }

    async fn reset_owner(&self, owner_id: &str) -> Result<ResetOutcome, ServiceError> {
        let filter = TagFilter::owner(owner_id);
        let before = self.index.count_matching(&filter).await;
        let report = self.index.delete_matching(&filter).await;
        if !report.is_confirmed() {
            self.metrics.record_delete_residue();
        }
        let documents_removed = self.catalog.remove_owner(owner_id).await?;

        tracing::info!(owner = owner_id, documents_removed, remaining = ?report.remaining, "Owner reset");
        Ok(ResetOutcome {
            status: "reset",
            approx_chunks_deleted: before
                .unwrap_or(0)
                .saturating_sub(report.remaining.unwrap_or(0)),
            documents_removed,
            remaining: report.remaining,
            verified: report.is_confirmed(),
        })
    }

    async fn reset_all(&self) -> Result<ResetAllOutcome, ServiceError> {
        self.index.reset_all().await?;
        let documents_removed = self.catalog.clear().await?;
        let conversations_removed = self.conversations.clear().await?;
        tracing::warn!(documents_removed, conversations_removed, "Full reset completed");
        Ok(ResetAllOutcome {
            status: "ok",
            documents_removed,
            conversations_removed,
        })
    }

    async fn health(&self) -> HealthReport {
        let index_status = self.index.health().await;
        HealthReport {
            ok: index_status.is_ok(),
            vector_backend: self.index.backend_name(),
            index_error: index_status.err().map(|error| error.to_string()),
            providers_supported: SUPPORTED_PROVIDERS.to_vec(),
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::unique_ids;

    #[test]
    fn unique_ids_trims_and_keeps_first_occurrence() {
        let ids = vec![
            " d2 ".to_string(),
            "d1".to_string(),
            "d2".to_string(),
            "".to_string(),
        ];
        assert_eq!(unique_ids(&ids), vec!["d2", "d1"]);
    }
}
