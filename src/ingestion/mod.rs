//! Document ingestion: chunking, embedding, and tagged index writes.

mod chunking;
mod service;
mod types;

pub use chunking::TextChunker;
pub use service::{IngestionService, chunk_document};
pub use types::{
    BlobMetadata, Chunk, ChunkingError, DocumentUpload, IngestError, IngestOutcome, IngestStatus,
    TextBlob,
};
