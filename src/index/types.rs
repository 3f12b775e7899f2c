//! Shared types used by the vector index and its backends.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned while interacting with a vector index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Vector width does not match the index configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was opened with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Backend-specific failure without an HTTP status.
    #[error("Index backend failure: {0}")]
    Backend(String),
}

/// Ownership and provenance tags carried by every record.
///
/// `owner_id` and `document_id` are set at ingestion and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTags {
    /// Owner the record belongs to.
    pub owner_id: String,
    /// Document the record was chunked from.
    pub document_id: String,
    /// Human-readable origin, usually the file name.
    pub source_label: String,
    /// 1-based page number when the source is paginated.
    pub page: Option<u32>,
}

/// A persisted chunk: identifier, vector, text, and tags.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Backend point identifier (UUID v4).
    pub id: String,
    /// Normalized embedding of `text`.
    pub embedding: Vec<f32>,
    /// Chunk text returned to the retriever.
    pub text: String,
    /// Ownership and provenance tags.
    pub tags: RecordTags,
}

impl VectorRecord {
    /// Create a record with a freshly generated identifier.
    pub fn new(embedding: Vec<f32>, text: String, tags: RecordTags) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            text,
            tags,
        }
    }
}

/// Which of an owner's documents a filter covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentScope {
    /// Every document of the owner.
    AllOwned,
    /// Only the listed documents.
    Only(Vec<String>),
}

/// Tag filter with AND semantics: owner matches and document is in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    /// Required owner.
    pub owner_id: String,
    /// Document restriction.
    pub documents: DocumentScope,
}

impl TagFilter {
    /// Filter over an explicit set of documents.
    pub fn documents<I, S>(owner_id: impl Into<String>, document_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owner_id: owner_id.into(),
            documents: DocumentScope::Only(document_ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Filter over a single document.
    pub fn document(owner_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self::documents(owner_id, [document_id.into()])
    }

    /// Filter over every document of an owner.
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            documents: DocumentScope::AllOwned,
        }
    }

    /// True when the filter can never match (empty document set).
    pub fn is_vacuous(&self) -> bool {
        matches!(&self.documents, DocumentScope::Only(ids) if ids.is_empty())
    }

    /// Evaluate the filter against a record's tags.
    pub fn matches(&self, tags: &RecordTags) -> bool {
        if tags.owner_id != self.owner_id {
            return false;
        }
        match &self.documents {
            DocumentScope::AllOwned => true,
            DocumentScope::Only(ids) => ids.iter().any(|id| id == &tags.document_id),
        }
    }
}

/// A filtered query hit, nearest first as ranked by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// Stored chunk text.
    pub text: String,
    /// Stored tags.
    pub tags: RecordTags,
    /// Similarity reported by the backend.
    pub score: f32,
}

/// Normalized query result.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Nothing matched the filter.
    Empty,
    /// At least one hit, nearest first.
    Hits(Vec<RetrievalHit>),
}

impl QueryOutcome {
    /// Wrap a hit list, mapping an empty list to [`QueryOutcome::Empty`].
    pub fn from_hits(hits: Vec<RetrievalHit>) -> Self {
        if hits.is_empty() {
            Self::Empty
        } else {
            Self::Hits(hits)
        }
    }

    /// Consume the outcome, yielding hits in rank order.
    pub fn into_hits(self) -> Vec<RetrievalHit> {
        match self {
            Self::Empty => Vec::new(),
            Self::Hits(hits) => hits,
        }
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Hits(hits) => hits.len(),
        }
    }

    /// True for [`QueryOutcome::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Result of one step of the verified delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step ran and the backend acknowledged it.
    Succeeded,
    /// Step ran and failed; treated as no progress.
    Failed,
    /// Step was not needed.
    Skipped,
}

/// Explicit outcome of [`crate::index::VectorIndex::delete_matching`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    /// Filtered bulk delete.
    pub bulk_delete: StepStatus,
    /// Count observed right after the bulk delete; `None` when unknown.
    pub survivors_after_bulk: Option<usize>,
    /// Identifier sweep over survivors.
    pub id_sweep: StepStatus,
    /// Number of identifiers the sweep resolved and deleted.
    pub swept_ids: usize,
    /// Final count; `None` when the backend could not be counted.
    pub remaining: Option<usize>,
}

impl DeleteReport {
    /// Report for a filter that cannot match anything.
    pub(crate) fn trivially_clean() -> Self {
        Self {
            bulk_delete: StepStatus::Skipped,
            survivors_after_bulk: Some(0),
            id_sweep: StepStatus::Skipped,
            swept_ids: 0,
            remaining: Some(0),
        }
    }

    /// Deletion confirmed: the final count was observed to be zero.
    pub fn is_confirmed(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(owner: &str, document: &str) -> RecordTags {
        RecordTags {
            owner_id: owner.into(),
            document_id: document.into(),
            source_label: "doc.pdf".into(),
            page: None,
        }
    }

    #[test]
    fn filter_requires_owner_and_document() {
        let filter = TagFilter::documents("u1", ["d1", "d2"]);
        assert!(filter.matches(&tags("u1", "d2")));
        assert!(!filter.matches(&tags("u2", "d1")));
        assert!(!filter.matches(&tags("u1", "d3")));
    }

    #[test]
    fn owner_filter_spans_documents_but_not_owners() {
        let filter = TagFilter::owner("u1");
        assert!(filter.matches(&tags("u1", "anything")));
        assert!(!filter.matches(&tags("u2", "anything")));
    }

    #[test]
    fn empty_document_set_is_vacuous() {
        assert!(TagFilter::documents("u1", Vec::<String>::new()).is_vacuous());
        assert!(!TagFilter::owner("u1").is_vacuous());
    }

    #[test]
    fn query_outcome_maps_empty_list() {
        assert_eq!(QueryOutcome::from_hits(Vec::new()), QueryOutcome::Empty);
        assert!(QueryOutcome::Empty.into_hits().is_empty());
    }
}
