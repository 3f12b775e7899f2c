//! Helpers for building stored payloads and reading them back into normalized hits.

use crate::index::types::{RecordTags, RetrievalHit};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub(crate) const TEXT_KEY: &str = "text";
pub(crate) const OWNER_KEY: &str = "owner_id";
pub(crate) const DOCUMENT_KEY: &str = "document_id";
pub(crate) const SOURCE_KEY: &str = "source";
pub(crate) const PAGE_KEY: &str = "page";

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(text: &str, tags: &RecordTags, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert(TEXT_KEY.into(), Value::String(text.to_string()));
    payload.insert(OWNER_KEY.into(), Value::String(tags.owner_id.clone()));
    payload.insert(DOCUMENT_KEY.into(), Value::String(tags.document_id.clone()));
    payload.insert(SOURCE_KEY.into(), Value::String(tags.source_label.clone()));
    if let Some(page) = tags.page {
        payload.insert(PAGE_KEY.into(), Value::from(page));
    }
    payload.insert(
        "chunk_hash".into(),
        Value::String(compute_chunk_hash(text)),
    );
    payload.insert(
        "ingested_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Read a stored payload back into a hit.
///
/// Returns `None` when the payload lacks text or ownership tags; such points are never
/// surfaced to the retriever.
pub(crate) fn hit_from_payload(payload: Option<Map<String, Value>>, score: f32) -> Option<RetrievalHit> {
    let mut map = payload?;
    let text = match map.remove(TEXT_KEY) {
        Some(Value::String(text)) if !text.is_empty() => text,
        _ => return None,
    };
    let owner_id = non_empty_string(map.remove(OWNER_KEY))?;
    let document_id = non_empty_string(map.remove(DOCUMENT_KEY))?;
    let source_label = non_empty_string(map.remove(SOURCE_KEY)).unwrap_or_default();
    let page = map.remove(PAGE_KEY).and_then(parse_page);

    Some(RetrievalHit {
        text,
        tags: RecordTags {
            owner_id,
            document_id,
            source_label,
            page,
        },
        score,
    })
}

fn non_empty_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn parse_page(value: Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|page| u32::try_from(page).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
