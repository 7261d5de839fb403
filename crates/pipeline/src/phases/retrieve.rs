//! Retrieval phase.
//!
//! Expands the clarified query into a search string, embeds it once, and
//! fans out across the index namespaces concurrently. A failing secondary
//! namespace degrades to an empty contribution; a failing general namespace
//! is fatal because no usable grounding exists without it.

use crate::error::{ErrorKind, PipelineError};
use crate::index::{DocumentIndex, IndexHit};
use crate::types::{
    ClarifiedQuery, CodeMetadata, Namespace, PhaseError, PipelinePhase, RetrievedDocument,
};
use ordinance_core::config::RetrievalConfig;
use ordinance_llm::EmbeddingClient;
use std::sync::Arc;

/// Retrieval phase executor.
#[derive(Clone)]
pub struct RetrievalPhase {
    index: Arc<dyn DocumentIndex>,
    embeddings: Arc<dyn EmbeddingClient>,
    config: RetrievalConfig,
    search_user_documents: bool,
    max_sources: usize,
}

impl RetrievalPhase {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        embeddings: Arc<dyn EmbeddingClient>,
        config: RetrievalConfig,
        search_user_documents: bool,
        max_sources: usize,
    ) -> Self {
        Self {
            index,
            embeddings,
            config,
            search_user_documents,
            max_sources,
        }
    }

    /// Retrieve candidate passages for the clarified query.
    ///
    /// Returns the merged, score-sorted document list (truncated to twice
    /// the source cap, leaving headroom for later filtering) and any
    /// per-namespace degradations to record.
    pub async fn execute(
        &self,
        clarified: &ClarifiedQuery,
    ) -> Result<(Vec<RetrievedDocument>, Vec<PhaseError>), PipelineError> {
        let search_query = build_search_query(clarified);
        tracing::info!(query = %search_query, "Retrieval phase: searching namespaces");

        let query_vector = self
            .embeddings
            .embed(&search_query)
            .await
            .map_err(|e| {
                PipelineError::new(
                    PipelinePhase::Retrieve,
                    ErrorKind::RetrievalFailed,
                    format!("query embedding failed: {}", e),
                )
            })?;

        // All namespace searches run concurrently; secondary namespaces are
        // skipped entirely when user-document search is disabled.
        let general = self.search_namespace(
            &self.config.general_namespace,
            &query_vector,
            self.config.general_limit,
            Namespace::General,
        );

        let user = async {
            if self.search_user_documents {
                Some(
                    self.search_namespace(
                        &self.config.user_namespace,
                        &query_vector,
                        self.config.user_limit,
                        Namespace::User,
                    )
                    .await,
                )
            } else {
                None
            }
        };

        let company = async {
            if self.search_user_documents {
                Some(
                    self.search_namespace(
                        &self.config.company_namespace,
                        &query_vector,
                        self.config.company_limit,
                        Namespace::Company,
                    )
                    .await,
                )
            } else {
                None
            }
        };

        let (general_result, user_result, company_result) = tokio::join!(general, user, company);

        let mut degradations = Vec::new();
        let mut documents = general_result.map_err(|e| {
            PipelineError::new(
                PipelinePhase::Retrieve,
                ErrorKind::RetrievalFailed,
                format!(
                    "general namespace '{}' unreachable: {}",
                    self.config.general_namespace, e
                ),
            )
        })?;

        for (result, namespace) in [
            (user_result, &self.config.user_namespace),
            (company_result, &self.config.company_namespace),
        ] {
            match result {
                Some(Ok(mut docs)) => documents.append(&mut docs),
                Some(Err(e)) => {
                    tracing::warn!(namespace = %namespace, "Namespace search degraded: {}", e);
                    degradations.push(PhaseError {
                        phase: PipelinePhase::Retrieve,
                        message: format!("namespace '{}' degraded: {}", namespace, e),
                    });
                }
                None => {}
            }
        }

        // Sort by relevance and keep headroom for verification filtering
        documents.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        documents.truncate(self.max_sources * 2);

        tracing::info!(count = documents.len(), "Retrieval complete");
        Ok((documents, degradations))
    }

    async fn search_namespace(
        &self,
        namespace: &str,
        query_vector: &[f32],
        limit: usize,
        source: Namespace,
    ) -> ordinance_core::AppResult<Vec<RetrievedDocument>> {
        let hits = self.index.search(namespace, query_vector, limit).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| convert_hit(hit, source))
            .collect())
    }
}

/// Build the expanded search string: question, municipality, property type,
/// and specific codes, in that order, space-joined.
pub fn build_search_query(clarified: &ClarifiedQuery) -> String {
    let mut parts = vec![clarified.question.clone()];

    if let Some(ref municipality) = clarified.municipality {
        parts.push(municipality.clone());
    }

    if let Some(ref property_type) = clarified.property_type {
        parts.push(property_type.clone());
    }

    parts.extend(clarified.specific_codes.iter().cloned());

    parts.join(" ")
}

/// Convert an index hit into a retrieved document. Hits whose metadata does
/// not parse are dropped with a warning rather than failing the namespace.
fn convert_hit(hit: IndexHit, source: Namespace) -> Option<RetrievedDocument> {
    match serde_json::from_value::<CodeMetadata>(hit.metadata.clone()) {
        Ok(metadata) => Some(RetrievedDocument {
            id: hit.id,
            content: hit.content,
            metadata,
            score: hit.score,
            source,
        }),
        Err(e) => {
            tracing::warn!(id = %hit.id, "Dropping hit with malformed metadata: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MockIndex;
    use ordinance_llm::providers::MockEmbeddingClient;

    fn make_hit(id: &str, score: f64) -> IndexHit {
        IndexHit {
            id: id.to_string(),
            content: format!("passage {}", id),
            metadata: serde_json::json!({
                "municipality": "Houston",
                "chapter": "42",
                "section": "1.2",
                "title": "Minimum Lot Size Requirements"
            }),
            score,
        }
    }

    fn phase(index: Arc<MockIndex>, search_user: bool) -> RetrievalPhase {
        RetrievalPhase::new(
            index,
            Arc::new(MockEmbeddingClient::new(16)),
            RetrievalConfig::default(),
            search_user,
            5,
        )
    }

    fn clarified() -> ClarifiedQuery {
        ClarifiedQuery {
            question: "What is the minimum lot size".to_string(),
            municipality: Some("Houston".to_string()),
            property_type: Some("residential".to_string()),
            specific_codes: vec!["Ch. 42".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_search_query_order() {
        let query = build_search_query(&clarified());
        assert_eq!(
            query,
            "What is the minimum lot size Houston residential Ch. 42"
        );
    }

    #[test]
    fn test_build_search_query_omits_absent_fields() {
        let clarified = ClarifiedQuery {
            question: "setbacks".to_string(),
            ..Default::default()
        };
        assert_eq!(build_search_query(&clarified), "setbacks");
    }

    #[tokio::test]
    async fn test_merges_and_sorts_across_namespaces() {
        let index = Arc::new(MockIndex::new());
        index.add_hit("building-codes-general", make_hit("gen-low", 0.70));
        index.add_hit("building-codes-general", make_hit("gen-high", 0.95));
        index.add_hit("user-documents", make_hit("user-mid", 0.87));

        let (documents, degradations) =
            phase(index.clone(), true).execute(&clarified()).await.unwrap();

        assert!(degradations.is_empty());
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["gen-high", "user-mid", "gen-low"]);
        assert_eq!(documents[1].source, Namespace::User);

        // All three namespaces were queried with their configured limits
        let searches = index.searches();
        assert_eq!(searches.len(), 3);
        assert!(searches.contains(&("building-codes-general".to_string(), 10)));
        assert!(searches.contains(&("user-documents".to_string(), 5)));
        assert!(searches.contains(&("company-exceptions".to_string(), 5)));
    }

    #[tokio::test]
    async fn test_user_search_disabled_skips_secondary_namespaces() {
        let index = Arc::new(MockIndex::new());
        index.add_hit("building-codes-general", make_hit("gen", 0.9));
        index.add_hit("user-documents", make_hit("user", 0.8));

        let (documents, _) = phase(index.clone(), false).execute(&clarified()).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(index.searches().len(), 1);
    }

    #[tokio::test]
    async fn test_secondary_namespace_failure_degrades() {
        let index = Arc::new(MockIndex::new());
        index.add_hit("building-codes-general", make_hit("gen", 0.9));
        index.fail_namespace("user-documents");

        let (documents, degradations) =
            phase(index, true).execute(&clarified()).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(degradations.len(), 1);
        assert!(degradations[0].message.contains("user-documents"));
    }

    #[tokio::test]
    async fn test_general_namespace_failure_is_fatal() {
        let index = Arc::new(MockIndex::new());
        index.fail_namespace("building-codes-general");

        let error = phase(index, true).execute(&clarified()).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::RetrievalFailed);
        assert_eq!(error.phase, PipelinePhase::Retrieve);
    }

    #[tokio::test]
    async fn test_truncates_to_twice_max_sources() {
        let index = Arc::new(MockIndex::new());
        for i in 0..12 {
            index.add_hit(
                "building-codes-general",
                make_hit(&format!("doc-{:02}", i), 1.0 - i as f64 * 0.01),
            );
        }

        let phase = RetrievalPhase::new(
            index,
            Arc::new(MockEmbeddingClient::new(16)),
            RetrievalConfig {
                general_limit: 12,
                ..Default::default()
            },
            false,
            3,
        );

        let (documents, _) = phase.execute(&clarified()).await.unwrap();
        assert_eq!(documents.len(), 6);
        assert_eq!(documents[0].id, "doc-00");
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_dropped() {
        let index = Arc::new(MockIndex::new());
        index.add_hit("building-codes-general", make_hit("good", 0.9));
        index.add_hit(
            "building-codes-general",
            IndexHit {
                id: "bad".to_string(),
                content: "passage".to_string(),
                metadata: serde_json::json!({"municipality": 42}),
                score: 0.95,
            },
        );

        let (documents, _) = phase(index, false).execute(&clarified()).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "good");
    }
}
