//! Configurable mock locator for tests.

use super::{LocateCandidate, LocateResult, SourceLocator};
use crate::types::{BoundingBox, PageRange};
use ordinance_core::{AppError, AppResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock source locator with scripted behavior.
pub struct MockLocator {
    exists: bool,
    candidates: Mutex<Vec<LocateCandidate>>,
    fail_locate: bool,
    access_url: String,
    exists_calls: AtomicUsize,
    locate_calls: AtomicUsize,
}

impl MockLocator {
    /// Locator where every document exists and fuzzy search returns the
    /// configured candidates.
    pub fn new() -> Self {
        Self {
            exists: true,
            candidates: Mutex::new(Vec::new()),
            fail_locate: false,
            access_url: "https://documents.example.com/view?token=mock".to_string(),
            exists_calls: AtomicUsize::new(0),
            locate_calls: AtomicUsize::new(0),
        }
    }

    /// Mark every document as missing.
    pub fn with_missing_documents(mut self) -> Self {
        self.exists = false;
        self
    }

    /// Make every locate call fail.
    pub fn with_failing_locate(mut self) -> Self {
        self.fail_locate = true;
        self
    }

    /// Set the candidates returned by locate.
    pub fn with_candidates(self, candidates: Vec<LocateCandidate>) -> Self {
        *self.candidates.lock().unwrap() = candidates;
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn locate_calls(&self) -> usize {
        self.locate_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience constructor for a candidate at a fixed position.
pub fn candidate(page: u32, text: &str, similarity: f64) -> LocateCandidate {
    LocateCandidate {
        page,
        text: text.to_string(),
        coordinates: BoundingBox {
            x: 100.0,
            y: 200.0,
            width: 400.0,
            height: 50.0,
        },
        similarity,
    }
}

#[async_trait::async_trait]
impl SourceLocator for MockLocator {
    async fn exists(&self, _source_ref: &str) -> AppResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exists)
    }

    async fn locate(
        &self,
        _source_ref: &str,
        _text: &str,
        _page_range: Option<&PageRange>,
    ) -> AppResult<LocateResult> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_locate {
            return Err(AppError::Locator("mock locate failure".to_string()));
        }

        let candidates = self.candidates.lock().unwrap().clone();
        Ok(LocateResult {
            found: !candidates.is_empty(),
            candidates,
        })
    }

    async fn access_url(&self, _source_ref: &str) -> AppResult<String> {
        Ok(self.access_url.clone())
    }
}
