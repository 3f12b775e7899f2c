//! Vector index: tagged records, filtered similarity queries, and verified deletion.

mod backend;
pub mod filters;
mod memory;
pub(crate) mod payload;
mod qdrant;
mod scroller;
mod types;
mod vector_index;

use std::sync::Arc;

pub use backend::IndexBackend;
pub use memory::MemoryBackend;
pub use payload::compute_chunk_hash;
pub use qdrant::QdrantBackend;
pub use types::{
    DeleteReport, DocumentScope, IndexError, QueryOutcome, RecordTags, RetrievalHit, StepStatus,
    TagFilter, VectorRecord,
};
pub use vector_index::VectorIndex;

use crate::config::{QdrantSettings, VectorBackend};

/// Build the configured backend and open the index at `dimension`.
pub async fn open_index(
    backend: VectorBackend,
    qdrant: &QdrantSettings,
    dimension: usize,
) -> Result<VectorIndex, IndexError> {
    let backend: Arc<dyn IndexBackend> = match backend {
        VectorBackend::Qdrant => Arc::new(QdrantBackend::new(qdrant)?),
        VectorBackend::Memory => Arc::new(MemoryBackend::new()),
    };
    VectorIndex::open(backend, dimension).await
}
