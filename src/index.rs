//! Remote vector index client.
//!
//! Defines the [`VectorIndex`] capability trait and the Pinecone-backed
//! implementation. Upserts are idempotent per record id — re-upserting an
//! identical id replaces the stored record. Transient outages (HTTP 429,
//! 5xx, network errors) are retried with capped exponential backoff;
//! validation failures are not.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::IndexConfig;

/// Vector index failure.
#[derive(Debug)]
pub enum IndexError {
    /// Transient connectivity loss or service overload. Safe to retry.
    Unavailable(String),
    /// Vector dimensionality differs from the index's configured
    /// dimension. Fatal — retrying cannot succeed.
    DimensionMismatch { expected: usize, got: usize },
    /// Non-retryable API error.
    Api(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Unavailable(e) => write!(f, "vector index unavailable: {}", e),
            IndexError::DimensionMismatch { expected, got } => write!(
                f,
                "vector dimension mismatch: index expects {}, got {}",
                expected, got
            ),
            IndexError::Api(e) => write!(f, "vector index API error: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// One record in the remote index: the vector plus enough metadata to
/// reconstruct provenance at retrieval time. Ownership transfers to the
/// index on upsert.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub document_id: String,
    pub chunk_index: usize,
}

/// A nearest-neighbor match returned by a query, highest similarity first.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub document_id: String,
    pub chunk_index: usize,
}

/// Remote similarity-search index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The index's configured vector dimension.
    fn dims(&self) -> usize;

    /// Insert-or-replace records keyed by id.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError>;

    /// Return up to `k` records ordered by descending similarity to
    /// `vector`. An index with fewer than `k` records returns what it
    /// has; an empty index returns an empty list, not an error.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>, IndexError>;
}

// ============ Pinecone ============

/// Pinecone REST client. The index is provisioned out of band with a
/// fixed name and dimension; `PINECONE_API_KEY` must be in the
/// environment.
pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| IndexError::Api("PINECONE_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Api(e.to_string()))?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            client,
        })
    }

    /// POST a JSON body with retry/backoff. 429 and 5xx responses and
    /// network errors retry; other 4xx responses fail immediately.
    async fn post_with_retry(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, IndexError> {
        let url = format!("{}{}", self.host, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<serde_json::Value>()
                            .await
                            .map_err(|e| IndexError::Api(e.to_string()));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(IndexError::Unavailable(format!(
                            "{}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(IndexError::Api(format!("{}: {}", status, body_text)));
                }
                Err(e) => {
                    last_err = Some(IndexError::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| IndexError::Unavailable("retries exhausted".into())))
    }

    fn check_dims(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            self.check_dims(&record.vector)?;
        }

        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "values": r.vector,
                    "metadata": {
                        "text": r.text,
                        "document_id": r.document_id,
                        "chunk_index": r.chunk_index,
                    },
                })
            })
            .collect();

        let mut body = serde_json::json!({ "vectors": vectors });
        if let Some(ref ns) = self.namespace {
            body["namespace"] = serde_json::json!(ns);
        }

        self.post_with_retry("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        self.check_dims(vector)?;

        let mut body = serde_json::json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
        });
        if let Some(ref ns) = self.namespace {
            body["namespace"] = serde_json::json!(ns);
        }

        let json = self.post_with_retry("/query", &body).await?;
        parse_query_response(&json)
    }
}

fn parse_query_response(json: &serde_json::Value) -> Result<Vec<QueryMatch>, IndexError> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| IndexError::Api("invalid query response: missing matches".into()))?;

    let mut results: Vec<QueryMatch> = matches
        .iter()
        .map(|m| {
            let metadata = m.get("metadata").cloned().unwrap_or(serde_json::json!({}));
            QueryMatch {
                id: m.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                score: m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                text: metadata
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                document_id: metadata
                    .get("document_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                chunk_index: metadata
                    .get("chunk_index")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_config(host: &str) -> IndexConfig {
        IndexConfig {
            host: host.to_string(),
            name: "test-index".to_string(),
            dims: 3,
            namespace: None,
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    fn test_index(host: &str) -> PineconeIndex {
        std::env::set_var("PINECONE_API_KEY", "test-key");
        PineconeIndex::new(&test_config(host)).unwrap()
    }

    fn record(id: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector,
            text: "chunk text".to_string(),
            document_id: "doc.pdf".to_string(),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn upsert_dimension_mismatch_fails_without_network() {
        let index = test_index("http://127.0.0.1:1");
        let err = index.upsert(&[record("c0", vec![1.0, 2.0])]).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[tokio::test]
    async fn query_dimension_mismatch_fails_without_network() {
        let index = test_index("http://127.0.0.1:1");
        let err = index.query(&[1.0], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn upsert_posts_records_with_metadata() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/vectors/upsert")
                    .header("Api-Key", "test-key")
                    .body_contains("doc.pdf");
                then.status(200).json_body(serde_json::json!({ "upsertedCount": 1 }));
            })
            .await;

        let index = test_index(&server.base_url());
        index.upsert(&[record("c0", vec![1.0, 2.0, 3.0])]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn query_parses_and_orders_matches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(200).json_body(serde_json::json!({
                    "matches": [
                        { "id": "b", "score": 0.4, "metadata": { "text": "beta", "document_id": "d", "chunk_index": 1 } },
                        { "id": "a", "score": 0.9, "metadata": { "text": "alpha", "document_id": "d", "chunk_index": 0 } },
                    ]
                }));
            })
            .await;

        let index = test_index(&server.base_url());
        let matches = index.query(&[0.1, 0.2, 0.3], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert!(matches[0].score >= matches[1].score);
        assert_eq!(matches[0].text, "alpha");
        assert_eq!(matches[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_not_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(200).json_body(serde_json::json!({ "matches": [] }));
            })
            .await;

        let index = test_index(&server.base_url());
        let matches = index.query(&[0.1, 0.2, 0.3], 10).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(503).body("maintenance");
            })
            .await;

        let index = test_index(&server.base_url());
        let err = index.query(&[0.1, 0.2, 0.3], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(400).body("bad request");
            })
            .await;

        std::env::set_var("PINECONE_API_KEY", "test-key");
        let mut cfg = test_config(&server.base_url());
        cfg.max_retries = 3;
        let index = PineconeIndex::new(&cfg).unwrap();

        let err = index.query(&[0.1, 0.2, 0.3], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::Api(_)));
        mock.assert_hits_async(1).await;
    }
}
