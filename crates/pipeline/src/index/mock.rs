//! In-memory mock index for tests.

use super::{DocumentIndex, IndexHit};
use ordinance_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Mock document index preloaded with hits per namespace.
///
/// Namespaces can be marked as failing to exercise the degradation paths.
/// Every search is recorded for assertions.
#[derive(Default)]
pub struct MockIndex {
    hits: Mutex<HashMap<String, Vec<IndexHit>>>,
    failing: Mutex<HashSet<String>>,
    searches: Mutex<Vec<(String, usize)>>,
}

impl MockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a hit into a namespace.
    pub fn add_hit(&self, namespace: &str, hit: IndexHit) {
        self.hits
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .push(hit);
    }

    /// Make every search against a namespace fail.
    pub fn fail_namespace(&self, namespace: &str) {
        self.failing.lock().unwrap().insert(namespace.to_string());
    }

    /// Recorded (namespace, limit) pairs in arrival order.
    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentIndex for MockIndex {
    async fn search(
        &self,
        namespace: &str,
        _query: &[f32],
        limit: usize,
    ) -> AppResult<Vec<IndexHit>> {
        self.searches
            .lock()
            .unwrap()
            .push((namespace.to_string(), limit));

        if self.failing.lock().unwrap().contains(namespace) {
            return Err(AppError::Index(format!(
                "mock failure for namespace '{}'",
                namespace
            )));
        }

        let hits = self.hits.lock().unwrap();
        Ok(hits
            .get(namespace)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> IndexHit {
        IndexHit {
            id: id.to_string(),
            content: format!("content of {}", id),
            metadata: serde_json::json!({}),
            score,
        }
    }

    #[tokio::test]
    async fn test_mock_returns_hits_up_to_limit() {
        let index = MockIndex::new();
        index.add_hit("general", hit("a", 0.9));
        index.add_hit("general", hit("b", 0.8));
        index.add_hit("general", hit("c", 0.7));

        let results = index.search("general", &[0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(index.searches(), vec![("general".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let index = MockIndex::new();
        index.fail_namespace("general");

        assert!(index.search("general", &[0.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_empty() {
        let index = MockIndex::new();
        let results = index.search("nothing-here", &[0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
