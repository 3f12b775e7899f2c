//! Retrieval: embed the question, query the owner's selected documents, and assemble a
//! deduplicated, citation-numbered context.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    embedding::{EmbeddingClientError, SharedEmbedder},
    index::{IndexError, RetrievalHit, TagFilter, VectorIndex},
};

/// Default number of index hits requested per question.
pub const DEFAULT_TOP_K: usize = 12;
/// Upper bound on hits requested per question.
pub const MAX_TOP_K: usize = 50;
/// Default number of passages handed to the prompt.
pub const DEFAULT_MAX_CONTEXT: usize = 6;

const PREVIEW_CHARS: usize = 200;

/// Errors emitted while retrieving context.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to return a vector for the question.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index query failed.
    #[error("Index query failed: {0}")]
    Index(#[from] IndexError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Effective retrieval sizes after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalLimits {
    /// Hits requested from the index, in `1..=50`.
    pub top_k: usize,
    /// Unique passages kept, in `1..=top_k`.
    pub max_context: usize,
}

impl RetrievalLimits {
    /// Clamp caller-supplied sizes, substituting defaults for missing values.
    pub fn clamped(top_k: Option<i64>, max_context: Option<i64>) -> Self {
        let top_k = top_k
            .unwrap_or(DEFAULT_TOP_K as i64)
            .clamp(1, MAX_TOP_K as i64) as usize;
        let max_context = max_context
            .unwrap_or(DEFAULT_MAX_CONTEXT as i64)
            .clamp(1, top_k as i64) as usize;
        Self { top_k, max_context }
    }
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// One numbered passage handed to the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    /// 1-based position in the numbered context block.
    pub citation_index: usize,
    /// Passage text.
    pub text: String,
    /// Origin label of the passage.
    pub source_label: String,
    /// Page the passage came from.
    pub page: Option<u32>,
    /// Document the passage belongs to.
    pub document_id: String,
}

/// UI-facing source entry, aligned with the citation numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// First 200 characters of the passage, `...` appended when truncated.
    pub snippet: String,
    /// Origin label.
    pub source: String,
    /// Page number when known.
    pub page: Option<u32>,
    /// Document identifier.
    pub doc_id: String,
}

/// Ordered context plus matching source records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    /// Numbered passages, citation order.
    pub items: Vec<ContextItem>,
    /// One source per item, same order.
    pub sources: Vec<SourceRecord>,
}

impl RetrievedContext {
    /// True when no usable passage was found.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Queries the index for an owner's selected documents.
#[derive(Clone)]
pub struct Retriever {
    embedder: SharedEmbedder,
    index: VectorIndex,
}

impl Retriever {
    /// Build a retriever over an opened index.
    pub fn new(embedder: SharedEmbedder, index: VectorIndex) -> Self {
        Self { embedder, index }
    }

    /// Retrieve context for `query` from `allowed_document_ids` of `owner_id`.
    ///
    /// The caller has already verified ownership of `allowed_document_ids`. An empty
    /// allowed set returns an empty context without embedding or querying.
    pub async fn retrieve(
        &self,
        query: &str,
        owner_id: &str,
        allowed_document_ids: &[String],
        limits: RetrievalLimits,
    ) -> Result<RetrievedContext, RetrievalError> {
        if allowed_document_ids.is_empty() {
            tracing::debug!(owner = owner_id, "No documents selected; skipping retrieval");
            return Ok(RetrievedContext::default());
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;

        let filter = TagFilter::documents(owner_id, allowed_document_ids.iter().cloned());
        let outcome = self.index.query(&vector, &filter, limits.top_k).await?;
        let hit_count = outcome.len();
        let context = assemble_context(outcome.into_hits(), limits.max_context);
        tracing::debug!(
            owner = owner_id,
            documents = allowed_document_ids.len(),
            top_k = limits.top_k,
            hits = hit_count,
            kept = context.items.len(),
            "Retrieved context"
        );
        Ok(context)
    }
}

/// Deduplicate hits by exact text in rank order and number the first `max_context`.
pub fn assemble_context(hits: Vec<RetrievalHit>, max_context: usize) -> RetrievedContext {
    let mut seen = HashSet::new();
    let mut context = RetrievedContext::default();

    for hit in hits {
        if context.items.len() >= max_context {
            break;
        }
        if !seen.insert(hit.text.clone()) {
            continue;
        }
        let citation_index = context.items.len() + 1;
        context.sources.push(SourceRecord {
            snippet: preview(&hit.text),
            source: hit.tags.source_label.clone(),
            page: hit.tags.page,
            doc_id: hit.tags.document_id.clone(),
        });
        context.items.push(ContextItem {
            citation_index,
            text: hit.text,
            source_label: hit.tags.source_label,
            page: hit.tags.page,
            document_id: hit.tags.document_id,
        });
    }

    context
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
