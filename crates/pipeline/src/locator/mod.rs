//! Source locator client.
//!
//! The locator is an external service that finds a text passage inside its
//! original source document via fuzzy search, and mints time-limited access
//! URLs for verified citations.

pub mod http;
pub mod mock;

pub use http::HttpLocator;
pub use mock::MockLocator;

use crate::types::{BoundingBox, PageRange};
use ordinance_core::AppResult;
use serde::{Deserialize, Serialize};

/// A fuzzy-match candidate inside a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocateCandidate {
    pub page: u32,
    pub text: String,
    pub coordinates: BoundingBox,
    /// Fuzzy match quality, within [0, 1]
    pub similarity: f64,
}

/// Result of a fuzzy search within a source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocateResult {
    pub found: bool,
    #[serde(default)]
    pub candidates: Vec<LocateCandidate>,
}

/// Trait for the source-location backend.
///
/// Implementations must be safe for concurrent use; verification fans out
/// per-document workers that share one locator.
#[async_trait::async_trait]
pub trait SourceLocator: Send + Sync {
    /// Check whether the source document is reachable.
    async fn exists(&self, source_ref: &str) -> AppResult<bool>;

    /// Fuzzy-search for `text` within the source document, optionally
    /// scoped to a page range.
    async fn locate(
        &self,
        source_ref: &str,
        text: &str,
        page_range: Option<&PageRange>,
    ) -> AppResult<LocateResult>;

    /// Produce a time-limited access URL for the source document.
    async fn access_url(&self, source_ref: &str) -> AppResult<String>;
}
