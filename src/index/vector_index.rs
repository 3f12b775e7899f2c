//! Owner-scoped vector index with consistency-verified deletion.

use std::sync::Arc;

use super::backend::IndexBackend;
use super::types::{
    DeleteReport, IndexError, QueryOutcome, StepStatus, TagFilter, VectorRecord,
};

/// Handle over one index backend, opened once by the composition root and shared.
#[derive(Clone)]
pub struct VectorIndex {
    backend: Arc<dyn IndexBackend>,
    dimension: usize,
}

impl VectorIndex {
    /// Ensure the backing collection exists and return a ready handle.
    pub async fn open(backend: Arc<dyn IndexBackend>, dimension: usize) -> Result<Self, IndexError> {
        backend.ensure_ready(dimension).await?;
        tracing::info!(backend = backend.name(), dimension, "Vector index opened");
        Ok(Self { backend, dimension })
    }

    /// Backend name, for logs and health output.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Vector width the index was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append records after checking every vector width.
    pub async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        if let Some(bad) = records
            .iter()
            .find(|record| record.embedding.len() != self.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.embedding.len(),
            });
        }
        self.backend.insert(records).await
    }

    /// Filtered similarity query. An unmatched filter yields [`QueryOutcome::Empty`].
    pub async fn query(
        &self,
        embedding: &[f32],
        filter: &TagFilter,
        limit: usize,
    ) -> Result<QueryOutcome, IndexError> {
        if filter.is_vacuous() || limit == 0 {
            return Ok(QueryOutcome::Empty);
        }
        if embedding.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        let hits = self.backend.query(embedding, filter, limit).await?;
        Ok(QueryOutcome::from_hits(hits))
    }

    /// Count records matching `filter`; `None` when the backend could not be counted.
    pub async fn count_matching(&self, filter: &TagFilter) -> Option<usize> {
        if filter.is_vacuous() {
            return Some(0);
        }
        match self.backend.count(filter).await {
            Ok(count) => Some(count),
            Err(error) => {
                tracing::warn!(
                    owner = %filter.owner_id,
                    error = %error,
                    "Count failed; treating as unknown"
                );
                None
            }
        }
    }

    /// Delete every record matching `filter` and report what is left.
    ///
    /// Runs a bulk delete, counts survivors, sweeps survivors by identifier when the
    /// count is positive or unknown, then counts again. Failures are recorded in the
    /// report and never returned as errors.
    pub async fn delete_matching(&self, filter: &TagFilter) -> DeleteReport {
        if filter.is_vacuous() {
            return DeleteReport::trivially_clean();
        }

        let bulk_delete = match self.backend.delete_by_filter(filter).await {
            Ok(()) => StepStatus::Succeeded,
            Err(error) => {
                tracing::warn!(owner = %filter.owner_id, error = %error, "Bulk delete failed");
                StepStatus::Failed
            }
        };

        let survivors_after_bulk = self.count_matching(filter).await;
        if survivors_after_bulk == Some(0) {
            return DeleteReport {
                bulk_delete,
                survivors_after_bulk,
                id_sweep: StepStatus::Skipped,
                swept_ids: 0,
                remaining: Some(0),
            };
        }

        let (id_sweep, swept_ids) = self.sweep_by_id(filter).await;
        let remaining = self.count_matching(filter).await;

        let report = DeleteReport {
            bulk_delete,
            survivors_after_bulk,
            id_sweep,
            swept_ids,
            remaining,
        };
        if !report.is_confirmed() {
            tracing::warn!(
                owner = %filter.owner_id,
                remaining = ?report.remaining,
                "Records may survive deletion"
            );
        }
        report
    }

    async fn sweep_by_id(&self, filter: &TagFilter) -> (StepStatus, usize) {
        let ids = match self.backend.matching_ids(filter).await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(owner = %filter.owner_id, error = %error, "Resolving surviving ids failed");
                return (StepStatus::Failed, 0);
            }
        };
        if ids.is_empty() {
            return (StepStatus::Succeeded, 0);
        }
        match self.backend.delete_by_ids(&ids).await {
            Ok(()) => {
                tracing::debug!(owner = %filter.owner_id, swept = ids.len(), "Swept surviving records by id");
                (StepStatus::Succeeded, ids.len())
            }
            Err(error) => {
                tracing::warn!(owner = %filter.owner_id, error = %error, "Delete by id failed");
                (StepStatus::Failed, 0)
            }
        }
    }

    /// Destroy every record and recreate the collection with the same configuration.
    pub async fn reset_all(&self) -> Result<(), IndexError> {
        self.backend.recreate(self.dimension).await?;
        tracing::warn!(backend = self.backend.name(), "Vector index reset");
        Ok(())
    }

    /// Reachability probe for health endpoints.
    pub async fn health(&self) -> Result<(), IndexError> {
        self.backend.ping().await
    }

    /// Release the handle.
    pub fn close(self) {
        tracing::debug!(backend = self.backend.name(), "Vector index closed");
    }
}
