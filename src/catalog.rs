//! Document ownership catalog.
//!
//! The catalog answers "which documents does this owner have" for listing and for the
//! ownership check that precedes every chat request. The vector index never consults it;
//! owner tags on the records themselves enforce isolation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by catalog implementations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Backing store could not be reached.
    #[error("document catalog unavailable: {0}")]
    Unavailable(String),
}

/// Catalog row recorded for every ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    /// Document identifier.
    #[serde(rename = "id")]
    pub document_id: String,
    /// Owner of the document.
    #[serde(skip)]
    pub owner_id: String,
    /// Original file name.
    #[serde(rename = "name")]
    pub filename: String,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// Size of the raw upload in bytes.
    pub size_bytes: u64,
    /// Page count reported by the extractor.
    pub page_count: Option<u32>,
    /// Number of chunks indexed for the document.
    pub chunk_count: usize,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Ownership registry for uploaded documents.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    /// Record a new document.
    async fn register(&self, entry: DocumentEntry) -> Result<(), CatalogError>;

    /// How many of `document_ids` belong to `owner_id`.
    async fn owned_count(&self, owner_id: &str, document_ids: &[String])
    -> Result<usize, CatalogError>;

    /// Documents of `owner_id`, newest first.
    async fn list(&self, owner_id: &str) -> Result<Vec<DocumentEntry>, CatalogError>;

    /// Remove one entry, returning it when it existed.
    async fn remove(
        &self,
        owner_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentEntry>, CatalogError>;

    /// Remove every entry of `owner_id`, returning how many were dropped.
    async fn remove_owner(&self, owner_id: &str) -> Result<usize, CatalogError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<usize, CatalogError>;
}

/// Process-local catalog.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<Vec<DocumentEntry>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentCatalog for InMemoryCatalog {
    async fn register(&self, entry: DocumentEntry) -> Result<(), CatalogError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn owned_count(
        &self,
        owner_id: &str,
        document_ids: &[String],
    ) -> Result<usize, CatalogError> {
        let entries = self.entries.read().await;
        let mut unique: Vec<&String> = document_ids.iter().collect();
        unique.sort();
        unique.dedup();
        Ok(unique
            .into_iter()
            .filter(|id| {
                entries
                    .iter()
                    .any(|entry| entry.owner_id == owner_id && entry.document_id == **id)
            })
            .count())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DocumentEntry>, CatalogError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn remove(
        &self,
        owner_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentEntry>, CatalogError> {
        let mut entries = self.entries.write().await;
        let position = entries
            .iter()
            .position(|entry| entry.owner_id == owner_id && entry.document_id == document_id);
        Ok(position.map(|index| entries.remove(index)))
    }

    async fn remove_owner(&self, owner_id: &str) -> Result<usize, CatalogError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.owner_id != owner_id);
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<usize, CatalogError> {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(owner: &str, document: &str) -> DocumentEntry {
        DocumentEntry {
            document_id: document.into(),
            owner_id: owner.into(),
            filename: format!("{document}.pdf"),
            content_type: Some("application/pdf".into()),
            size_bytes: 10,
            page_count: Some(1),
            chunk_count: 1,
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn owned_count_ignores_foreign_and_duplicate_ids() {
        let catalog = InMemoryCatalog::new();
        catalog.register(entry("u1", "d1")).await.expect("register");
        catalog.register(entry("u2", "d2")).await.expect("register");

        let ids = vec!["d1".to_string(), "d1".to_string(), "d2".to_string()];
        assert_eq!(catalog.owned_count("u1", &ids).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_scoped() {
        let catalog = InMemoryCatalog::new();
        catalog.register(entry("u1", "old")).await.expect("register");
        catalog.register(entry("u2", "foreign")).await.expect("register");
        catalog.register(entry("u1", "new")).await.expect("register");

        let ids: Vec<_> = catalog
            .list("u1")
            .await
            .expect("list")
            .into_iter()
            .map(|entry| entry.document_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn remove_only_touches_the_owner() {
        let catalog = InMemoryCatalog::new();
        catalog.register(entry("u1", "d1")).await.expect("register");

        assert!(catalog.remove("u2", "d1").await.expect("remove").is_none());
        assert!(catalog.remove("u1", "d1").await.expect("remove").is_some());
        assert!(catalog.remove("u1", "d1").await.expect("remove").is_none());
    }
}
