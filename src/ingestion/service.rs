//! Ingestion: chunk, embed, and index one uploaded document.

use std::sync::Arc;

use crate::{
    catalog::{DocumentCatalog, DocumentEntry},
    embedding::SharedEmbedder,
    index::{RecordTags, VectorIndex, VectorRecord, payload::current_timestamp_rfc3339},
    metrics::PipelineMetrics,
};

use super::chunking::TextChunker;
use super::types::{Chunk, DocumentUpload, IngestError, IngestOutcome, IngestStatus};

/// Coordinates chunking, embedding, and index writes for uploaded documents.
///
/// Construct once near process start and share through an `Arc`.
pub struct IngestionService {
    chunker: TextChunker,
    embedder: SharedEmbedder,
    index: VectorIndex,
    catalog: Arc<dyn DocumentCatalog>,
    metrics: Arc<PipelineMetrics>,
}

impl IngestionService {
    /// Wire the service from explicitly constructed collaborators.
    pub fn new(
        chunker: TextChunker,
        embedder: SharedEmbedder,
        index: VectorIndex,
        catalog: Arc<dyn DocumentCatalog>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            catalog,
            metrics,
        }
    }

    /// Chunk, embed, and index a document for `owner_id`.
    ///
    /// A fresh document id is generated for every call. Uploads without usable text still
    /// get a catalog entry and report [`IngestStatus::NoTextFound`].
    pub async fn ingest(
        &self,
        owner_id: &str,
        upload: DocumentUpload,
    ) -> Result<IngestOutcome, IngestError> {
        let document_id = uuid::Uuid::new_v4().to_string();
        let chunks = chunk_document(&self.chunker, owner_id, &document_id, &upload);
        tracing::info!(
            owner = owner_id,
            document = %document_id,
            filename = %upload.filename,
            blobs = upload.blobs.len(),
            chunks = chunks.len(),
            "Ingesting document"
        );

        let inserted = if chunks.is_empty() {
            0
        } else {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.embedder.generate_embeddings(texts).await?;
            let records: Vec<VectorRecord> = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorRecord::new(embedding, chunk.text, chunk.tags))
                .collect();
            self.index.insert(records).await?
        };

        self.catalog
            .register(DocumentEntry {
                document_id: document_id.clone(),
                owner_id: owner_id.to_string(),
                filename: upload.filename.clone(),
                content_type: upload.content_type.clone(),
                size_bytes: upload.size_bytes,
                page_count: upload.page_count,
                chunk_count: inserted,
                created_at: current_timestamp_rfc3339(),
            })
            .await?;
        self.metrics.record_document(inserted as u64);

        let status = if inserted == 0 {
            IngestStatus::NoTextFound
        } else {
            IngestStatus::Indexed
        };
        tracing::info!(owner = owner_id, document = %document_id, chunks = inserted, ?status, "Document ingested");

        Ok(IngestOutcome {
            status,
            chunks: inserted,
            document_id,
            filename: upload.filename,
        })
    }
}

/// Split every blob of `upload` and tag the passages with owner, document, and provenance.
///
/// The source label is the blob's own `source` when present, else the upload's file name.
pub fn chunk_document(
    chunker: &TextChunker,
    owner_id: &str,
    document_id: &str,
    upload: &DocumentUpload,
) -> Vec<Chunk> {
    upload
        .blobs
        .iter()
        .flat_map(|blob| {
            let source_label = blob
                .metadata
                .source
                .as_deref()
                .map(str::trim)
                .filter(|source| !source.is_empty())
                .unwrap_or(&upload.filename)
                .to_string();
            let page = blob.metadata.page;
            chunker.split(&blob.text).into_iter().map(move |text| Chunk {
                text,
                tags: RecordTags {
                    owner_id: owner_id.to_string(),
                    document_id: document_id.to_string(),
                    source_label: source_label.clone(),
                    page,
                },
            })
        })
        .collect()
}
