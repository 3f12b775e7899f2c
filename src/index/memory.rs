//! In-process index backend for tests and single-node development.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; queries are brute-force cosine
//! similarity over every matching record.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::backend::IndexBackend;
use super::types::{IndexError, RetrievalHit, TagFilter, VectorRecord};

/// In-memory vector index backend.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<VectorRecord>>, IndexError> {
        self.records
            .read()
            .map_err(|_| IndexError::Backend("memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<VectorRecord>>, IndexError> {
        self.records
            .write()
            .map_err(|_| IndexError::Backend("memory index lock poisoned".into()))
    }
}

pub(crate) fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl IndexBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_ready(&self, _dimension: usize) -> Result<(), IndexError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), IndexError> {
        self.read().map(|_| ())
    }

    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        let count = records.len();
        self.write()?.extend(records);
        Ok(count)
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &TagFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalHit>, IndexError> {
        let records = self.read()?;
        let mut hits: Vec<RetrievalHit> = records
            .iter()
            .filter(|record| filter.matches(&record.tags))
            .map(|record| RetrievalHit {
                text: record.text.clone(),
                tags: record.tags.clone(),
                score: cosine_sim(embedding, &record.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, filter: &TagFilter) -> Result<usize, IndexError> {
        Ok(self
            .read()?
            .iter()
            .filter(|record| filter.matches(&record.tags))
            .count())
    }

    async fn delete_by_filter(&self, filter: &TagFilter) -> Result<(), IndexError> {
        self.write()?.retain(|record| !filter.matches(&record.tags));
        Ok(())
    }

    async fn matching_ids(&self, filter: &TagFilter) -> Result<Vec<String>, IndexError> {
        Ok(self
            .read()?
            .iter()
            .filter(|record| filter.matches(&record.tags))
            .map(|record| record.id.clone())
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), IndexError> {
        self.write()?.retain(|record| !ids.contains(&record.id));
        Ok(())
    }

    async fn recreate(&self, _dimension: usize) -> Result<(), IndexError> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RecordTags;

    fn record(owner: &str, document: &str, text: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord::new(
            embedding,
            text.into(),
            RecordTags {
                owner_id: owner.into(),
                document_id: document.into(),
                source_label: format!("{document}.txt"),
                page: None,
            },
        )
    }

    #[test]
    fn cosine_sim_handles_degenerate_vectors() {
        assert_eq!(cosine_sim(&[], &[]), 0.0);
        assert_eq!(cosine_sim(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_sim(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_sim(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_ranks_nearest_first_within_filter() {
        let backend = MemoryBackend::new();
        backend
            .insert(vec![
                record("u1", "d1", "far", vec![0.0, 1.0]),
                record("u1", "d1", "near", vec![1.0, 0.0]),
                record("u2", "d1", "foreign", vec![1.0, 0.0]),
            ])
            .await
            .expect("insert");

        let hits = backend
            .query(&[1.0, 0.0], &TagFilter::document("u1", "d1"), 10)
            .await
            .expect("query");
        let texts: Vec<_> = hits.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn delete_by_filter_keeps_other_owners() {
        let backend = MemoryBackend::new();
        backend
            .insert(vec![
                record("u1", "d1", "a", vec![1.0]),
                record("u2", "d1", "b", vec![1.0]),
            ])
            .await
            .expect("insert");

        backend
            .delete_by_filter(&TagFilter::document("u1", "d1"))
            .await
            .expect("delete");
        assert_eq!(backend.count(&TagFilter::owner("u1")).await.expect("count"), 0);
        assert_eq!(backend.count(&TagFilter::owner("u2")).await.expect("count"), 1);
    }
}
