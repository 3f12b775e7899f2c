//! Upload shapes, outcomes, and errors for the ingestion pipeline.

use crate::{catalog::CatalogError, embedding::EmbeddingClientError, index::IndexError};
use crate::index::RecordTags;
use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured encoding.
    #[error("failed to initialize tokenizer '{model}': {source}")]
    Tokenizer {
        /// Model or encoding name we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index rejected the records.
    #[error("Index write failed: {0}")]
    Index(#[from] IndexError),
    /// Document entry could not be recorded.
    #[error("Catalog write failed: {0}")]
    Catalog(#[from] CatalogError),
}

/// Metadata attached to one extracted text blob.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlobMetadata {
    /// Origin label, usually the file name.
    #[serde(default)]
    pub source: Option<String>,
    /// Page the blob was extracted from.
    #[serde(default)]
    pub page: Option<u32>,
}

/// One unit of extracted text, typically a page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBlob {
    /// Extracted text.
    pub text: String,
    /// Provenance metadata.
    #[serde(default)]
    pub metadata: BlobMetadata,
}

/// A document upload after text extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    /// Original file name.
    pub filename: String,
    /// Declared MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Size of the raw upload in bytes.
    #[serde(default)]
    pub size_bytes: u64,
    /// Page count reported by the extractor.
    #[serde(default)]
    pub page_count: Option<u32>,
    /// Extracted blobs in document order.
    #[serde(default)]
    pub blobs: Vec<TextBlob>,
}

/// A chunk ready for embedding, tagged with its owner and document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Passage text.
    pub text: String,
    /// Ownership and provenance tags.
    pub tags: RecordTags,
}

/// Whether an upload produced any indexed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// At least one chunk was indexed.
    Indexed,
    /// The upload carried no usable text.
    NoTextFound,
}

/// Summary returned by [`crate::ingestion::IngestionService::ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Ingestion status.
    pub status: IngestStatus,
    /// Number of chunks indexed.
    pub chunks: usize,
    /// Identifier assigned to the document.
    #[serde(rename = "doc_id")]
    pub document_id: String,
    /// File name echoed back to the caller.
    pub filename: String,
}
