//! Primitive operations every vector index backend provides.
//!
//! Backends stay thin: they translate each primitive into the store's own calls and
//! normalize responses. Composite behavior (verified delete, dimension checks, vacuous
//! filters) lives once in [`crate::index::VectorIndex`].

use async_trait::async_trait;

use super::types::{IndexError, RetrievalHit, TagFilter, VectorRecord};

/// Interface implemented by vector index backends.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Make sure the backing collection exists with cosine similarity at `dimension`.
    async fn ensure_ready(&self, dimension: usize) -> Result<(), IndexError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), IndexError>;

    /// Append records. No deduplication.
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError>;

    /// Nearest-first hits restricted to `filter`, at most `limit`.
    async fn query(
        &self,
        embedding: &[f32],
        filter: &TagFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalHit>, IndexError>;

    /// Exact number of records matching `filter`.
    async fn count(&self, filter: &TagFilter) -> Result<usize, IndexError>;

    /// Bulk delete by filter. May be eventually consistent.
    async fn delete_by_filter(&self, filter: &TagFilter) -> Result<(), IndexError>;

    /// Identifiers of records currently matching `filter`.
    async fn matching_ids(&self, filter: &TagFilter) -> Result<Vec<String>, IndexError>;

    /// Delete records by identifier.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), IndexError>;

    /// Drop everything and recreate an empty collection with the same configuration.
    async fn recreate(&self, dimension: usize) -> Result<(), IndexError>;
}
