use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    refusals: AtomicU64,
    deletes_with_residue: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a completed question, refused or not.
    pub fn record_answer(&self, refused: bool) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        if refused {
            self.refusals.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a verified delete that could not confirm zero survivors.
    pub fn record_delete_residue(&self) {
        self.deletes_with_residue.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            refusals: self.refusals.load(Ordering::Relaxed),
            deletes_with_residue: self.deletes_with_residue.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup, including ones without text.
    pub documents_ingested: u64,
    /// Total chunks indexed across all documents.
    pub chunks_indexed: u64,
    /// Questions that received a reply.
    pub questions_answered: u64,
    /// Replies that were the fixed refusal.
    pub refusals: u64,
    /// Deletes whose final count was positive or unknown.
    pub deletes_with_residue: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(2);
        metrics.record_document(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 2);
    }

    #[test]
    fn refusals_count_as_answers() {
        let metrics = PipelineMetrics::new();
        metrics.record_answer(false);
        metrics.record_answer(true);
        metrics.record_delete_residue();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.refusals, 1);
        assert_eq!(snapshot.deletes_with_residue, 1);
    }
}
