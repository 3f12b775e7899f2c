//! Translate tag filters into Qdrant filter payloads.

use serde_json::{Value, json};

use super::payload::{DOCUMENT_KEY, OWNER_KEY};
use super::types::{DocumentScope, TagFilter};

/// Compose the Qdrant `must` filter for a tag filter.
///
/// Owner is always an exact match; a document set becomes a `match.any` clause.
pub fn build_tag_filter(filter: &TagFilter) -> Value {
    let mut must = vec![json!({
        "key": OWNER_KEY,
        "match": { "value": filter.owner_id }
    })];

    if let DocumentScope::Only(ids) = &filter.documents {
        must.push(json!({
            "key": DOCUMENT_KEY,
            "match": { "any": ids }
        }));
    }

    json!({ "must": must })
}
