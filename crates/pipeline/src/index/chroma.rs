//! Chroma REST client for the document index.
//!
//! Chroma API: https://docs.trychroma.com/reference

use super::{DocumentIndex, IndexHit};
use ordinance_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Chroma query request format.
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: Vec<&'static str>,
}

/// Chroma query response format. Results are grouped per query embedding;
/// we always send exactly one embedding.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    distances: Vec<Vec<f64>>,
}

/// Chroma-backed document index.
pub struct ChromaIndex {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ChromaIndex {
    /// Create a new Chroma client.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            api_key,
            client,
        }
    }
}

#[async_trait::async_trait]
impl DocumentIndex for ChromaIndex {
    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        limit: usize,
    ) -> AppResult<Vec<IndexHit>> {
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url.trim_end_matches('/'),
            namespace
        );

        let request = QueryRequest {
            query_embeddings: vec![query],
            n_results: limit,
            include: vec!["documents", "metadatas", "distances"],
        };

        tracing::debug!(namespace, limit, "Querying document index");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Failed to reach index: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Index(format!(
                "Index API error ({}) for namespace '{}': {}",
                status, namespace, error_text
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| AppError::Index(format!("Failed to parse index response: {}", e)))?;

        Ok(convert_response(body))
    }
}

/// Flatten the first (and only) result group into hits. Chroma returns
/// cosine distances; convert to a similarity-style score.
fn convert_response(body: QueryResponse) -> Vec<IndexHit> {
    let ids = body.ids.into_iter().next().unwrap_or_default();
    let mut documents = body
        .documents
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = body.metadatas.into_iter().next().unwrap_or_default().into_iter();
    let mut distances = body.distances.into_iter().next().unwrap_or_default().into_iter();

    ids.into_iter()
        .map(|id| IndexHit {
            id,
            content: documents.next().flatten().unwrap_or_default(),
            metadata: metadatas.next().unwrap_or(serde_json::Value::Null),
            score: 1.0 - distances.next().unwrap_or(1.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_response_pairs_columns() {
        let body = QueryResponse {
            ids: vec![vec!["doc-001".to_string(), "doc-002".to_string()]],
            documents: vec![vec![Some("first".to_string()), Some("second".to_string())]],
            metadatas: vec![vec![
                serde_json::json!({"municipality": "Houston"}),
                serde_json::json!({"municipality": "Austin"}),
            ]],
            distances: vec![vec![0.05, 0.35]],
        };

        let hits = convert_response(body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "doc-001");
        assert_eq!(hits[0].content, "first");
        assert!((hits[0].score - 0.95).abs() < 1e-9);
        assert!((hits[1].score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_convert_response_tolerates_missing_columns() {
        let body = QueryResponse {
            ids: vec![vec!["doc-001".to_string()]],
            documents: vec![],
            metadatas: vec![],
            distances: vec![],
        };

        let hits = convert_response(body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "");
        assert_eq!(hits[0].score, 0.0);
        assert!(hits[0].metadata.is_null());
    }

    #[test]
    fn test_empty_response() {
        let body = QueryResponse {
            ids: vec![],
            documents: vec![],
            metadatas: vec![],
            distances: vec![],
        };

        assert!(convert_response(body).is_empty());
    }
}
