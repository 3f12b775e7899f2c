//! Stream point identifiers from the Qdrant scroll endpoint.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use super::qdrant::{QdrantBackend, stringify_point_id};
use super::types::IndexError;

const DEFAULT_SCROLL_LIMIT: usize = 512;

/// Stream identifiers of points matching `filter`, page by page.
pub(crate) fn stream_point_ids(
    backend: &QdrantBackend,
    filter: Value,
) -> impl Stream<Item = Result<String, IndexError>> + '_ {
    try_stream! {
        let mut offset: Option<Value> = None;

        loop {
            let body = json!({
                "with_payload": false,
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter.clone(),
                "offset": offset.clone(),
            });

            let response = backend
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", backend.collection),
                )
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let Some(id) = point.id {
                        yield stringify_point_id(id);
                    }
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = Some(next),
                    _ => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = %backend.collection, status = %status, "Failed to scroll point ids");
                Err(IndexError::UnexpectedStatus { status, body })?;
            }
        }
    }
}

#[derive(Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<ScrollPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct ScrollPoint {
    #[serde(default)]
    id: Option<Value>,
}
