//! HTTP backend for a Qdrant collection.

use crate::config::QdrantSettings;
use crate::index::{
    backend::IndexBackend,
    filters::build_tag_filter,
    payload::{build_payload, current_timestamp_rfc3339, hit_from_payload},
    scroller::stream_point_ids,
    types::{IndexError, RetrievalHit, TagFilter, VectorRecord},
};
use async_trait::async_trait;
use futures_util::{pin_mut, stream::StreamExt};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

const PAYLOAD_INDEXES: [&str; 2] = ["owner_id", "document_id"];

/// Lightweight HTTP client bound to one Qdrant collection.
pub struct QdrantBackend {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantBackend {
    /// Construct a client from explicit settings.
    pub fn new(settings: &QdrantSettings) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("groundwork/0.1").build()?;
        let base_url = normalize_base_url(&settings.url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %settings.collection_name,
            has_api_key = settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
            collection: settings.collection_name.clone(),
        })
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let response = self.request(Method::GET, "collections").send().await?;
        let response = self.check(response, "list collections").await?;
        let payload: ListCollectionsResponse = response.json().await?;
        Ok(payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;
        self.check(response, "create collection").await?;
        tracing::info!(collection = %self.collection, vector_size, "Collection created");
        Ok(())
    }

    async fn ensure_payload_indexes(&self) -> Result<(), IndexError> {
        for field in PAYLOAD_INDEXES {
            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .query(&[("wait", true)])
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {
                    tracing::debug!(collection = %self.collection, field, "Payload index ensured");
                }
                StatusCode::CONFLICT => {
                    tracing::debug!(collection = %self.collection, field, "Payload index already exists");
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    let error = IndexError::UnexpectedStatus { status, body };
                    tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
                }
            }
        }
        Ok(())
    }

    async fn delete_points(&self, selector: Value) -> Result<(), IndexError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&selector)
            .send()
            .await?;
        self.check(response, "delete points").await?;
        Ok(())
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn check(
        &self,
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, IndexError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = IndexError::UnexpectedStatus { status, body };
        tracing::error!(collection = %self.collection, operation, error = %error, "Qdrant request failed");
        Err(error)
    }
}

#[async_trait]
impl IndexBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_ready(&self, dimension: usize) -> Result<(), IndexError> {
        if !self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, dimension, "Creating collection");
            self.create_collection(dimension).await?;
        }
        self.ensure_payload_indexes().await
    }

    async fn ping(&self) -> Result<(), IndexError> {
        let collections = self.list_collections().await?;
        if collections.iter().any(|name| name == &self.collection) {
            Ok(())
        } else {
            Err(IndexError::Backend(format!(
                "collection {} is missing",
                self.collection
            )))
        }
    }

    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let points: Vec<Value> = records
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.embedding,
                    "payload": build_payload(&record.text, &record.tags, &now),
                })
            })
            .collect();
        let point_count = points.len();

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.check(response, "upsert points").await?;
        tracing::debug!(collection = %self.collection, points = point_count, "Points indexed");
        Ok(point_count)
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &TagFilter,
        limit: usize,
    ) -> Result<Vec<RetrievalHit>, IndexError> {
        let body = json!({
            "query": embedding,
            "limit": limit,
            "with_payload": true,
            "filter": build_tag_filter(filter),
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;
        let response = self.check(response, "query points").await?;

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points, .. } => points,
        };
        let returned = points.len();
        let hits: Vec<RetrievalHit> = points
            .into_iter()
            .filter_map(|point| hit_from_payload(point.payload, point.score))
            .collect();
        if hits.len() < returned {
            tracing::debug!(
                collection = %self.collection,
                dropped = returned - hits.len(),
                "Skipped points without text or ownership payload"
            );
        }
        Ok(hits)
    }

    async fn count(&self, filter: &TagFilter) -> Result<usize, IndexError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&json!({ "filter": build_tag_filter(filter), "exact": true }))
            .send()
            .await?;
        let response = self.check(response, "count points").await?;
        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    async fn delete_by_filter(&self, filter: &TagFilter) -> Result<(), IndexError> {
        self.delete_points(json!({ "filter": build_tag_filter(filter) }))
            .await
    }

    async fn matching_ids(&self, filter: &TagFilter) -> Result<Vec<String>, IndexError> {
        let stream = stream_point_ids(self, build_tag_filter(filter));
        pin_mut!(stream);
        let mut ids = Vec::new();
        while let Some(id) = stream.next().await {
            ids.push(id?);
        }
        Ok(ids)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_points(json!({ "points": ids })).await
    }

    async fn recreate(&self, dimension: usize) -> Result<(), IndexError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{}", self.collection))
            .send()
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            self.check(response, "drop collection").await?;
        }
        tracing::warn!(collection = %self.collection, "Collection dropped");
        self.create_collection(dimension).await?;
        self.ensure_payload_indexes().await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    result: ListCollectionsResult,
}

#[derive(Deserialize)]
struct ListCollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, POST, PUT},
        MockServer,
    };

    pub(crate) fn backend_for(server: &MockServer) -> QdrantBackend {
        QdrantBackend {
            client: Client::builder()
                .user_agent("groundwork-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
            collection: "docs".into(),
        }
    }

    #[tokio::test]
    async fn query_sends_owner_and_document_filter() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/query")
                    .json_body_partial(
                        json!({
                            "limit": 12,
                            "with_payload": true,
                            "filter": {
                                "must": [
                                    { "key": "owner_id", "match": { "value": "u1" } },
                                    { "key": "document_id", "match": { "any": ["d1"] } }
                                ]
                            }
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "p-1",
                                "score": 0.91,
                                "payload": {
                                    "text": "Paris is the capital of France.",
                                    "owner_id": "u1",
                                    "document_id": "d1",
                                    "source": "facts.pdf",
                                    "page": 2
                                }
                            },
                            { "id": "p-2", "score": 0.5, "payload": { "text": "orphan" } }
                        ]
                    }
                }));
            })
            .await;

        let backend = backend_for(&server);
        let hits = backend
            .query(&[0.1, 0.2], &TagFilter::document("u1", "d1"), 12)
            .await
            .expect("query");

        mock.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Paris is the capital of France.");
        assert_eq!(hits[0].tags.page, Some(2));
        assert_eq!(hits[0].tags.source_label, "facts.pdf");
    }

    #[tokio::test]
    async fn query_accepts_flat_result_lists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/query");
                then.status(200).json_body(json!({
                    "result": [
                        {
                            "id": 7,
                            "score": 0.3,
                            "payload": { "text": "t", "owner_id": "u1", "document_id": "d1" }
                        }
                    ]
                }));
            })
            .await;

        let hits = backend_for(&server)
            .query(&[0.1], &TagFilter::document("u1", "d1"), 3)
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tags.source_label, "");
    }

    #[tokio::test]
    async fn count_reads_exact_count() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/count")
                    .json_body_partial(json!({ "exact": true }).to_string());
                then.status(200)
                    .json_body(json!({ "result": { "count": 4 } }));
            })
            .await;

        let count = backend_for(&server)
            .count(&TagFilter::document("u1", "d1"))
            .await
            .expect("count");
        mock.assert();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn delete_by_ids_posts_point_list() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/delete")
                    .query_param("wait", "true")
                    .json_body(json!({ "points": ["a", "b"] }));
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        backend_for(&server)
            .delete_by_ids(&["a".to_string(), "b".to_string()])
            .await
            .expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn insert_writes_tagged_payloads() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .body_contains("\"owner_id\":\"u1\"")
                    .body_contains("\"document_id\":\"d1\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let record = VectorRecord::new(
            vec![1.0, 0.0],
            "chunk".into(),
            crate::index::RecordTags {
                owner_id: "u1".into(),
                document_id: "d1".into(),
                source_label: "a.txt".into(),
                page: None,
            },
        );
        let inserted = backend_for(&server)
            .insert(vec![record])
            .await
            .expect("insert");
        mock.assert();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn recreate_drops_then_creates_collection() {
        let server = MockServer::start_async().await;
        let drop = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .json_body(json!({ "vectors": { "size": 8, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        backend_for(&server).recreate(8).await.expect("recreate");
        drop.assert();
        create.assert();
        indexes.assert_hits(2);
    }

    #[test]
    fn stringify_point_id_handles_shapes() {
        assert_eq!(stringify_point_id(json!("abc")), "abc");
        assert_eq!(stringify_point_id(json!(42)), "42");
        assert_eq!(stringify_point_id(json!({ "uuid": "u-1" })), "u-1");
    }
}
