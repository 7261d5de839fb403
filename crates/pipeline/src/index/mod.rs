//! Document index client.
//!
//! The index is an external vector-search service partitioned into
//! namespaces (general codes, user documents, company exceptions). The
//! pipeline depends only on the [`DocumentIndex`] trait; the Chroma REST
//! client is the production implementation and the in-memory mock backs the
//! tests.

pub mod chroma;
pub mod mock;

pub use chroma::ChromaIndex;
pub use mock::MockIndex;

use ordinance_core::AppResult;

/// A ranked hit returned from a namespace search.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub content: String,
    /// Raw metadata payload; parsed into `CodeMetadata` by the retrieval phase
    pub metadata: serde_json::Value,
    /// Relevance score on the index-defined scale
    pub score: f64,
}

/// Trait for the vector-search backend.
///
/// Implementations must be safe for concurrent use from multiple
/// simultaneous pipeline invocations.
#[async_trait::async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Search one namespace with a query vector, returning up to `limit`
    /// ranked hits.
    async fn search(&self, namespace: &str, query: &[f32], limit: usize)
        -> AppResult<Vec<IndexHit>>;
}
