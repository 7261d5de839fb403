//! REST client for the source locator service.

use super::{LocateResult, SourceLocator};
use crate::types::PageRange;
use ordinance_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    source_ref: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_end: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessUrlRequest<'a> {
    source_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccessUrlResponse {
    url: String,
}

/// HTTP-backed source locator.
pub struct HttpLocator {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpLocator {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl SourceLocator for HttpLocator {
    async fn exists(&self, source_ref: &str) -> AppResult<bool> {
        let response = self
            .authorized(self.client.get(self.endpoint("documents/exists")))
            .query(&[("ref", source_ref)])
            .send()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to reach locator: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Locator(format!(
                "Locator API error ({})",
                response.status()
            )));
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to parse locator response: {}", e)))?;

        Ok(body.exists)
    }

    async fn locate(
        &self,
        source_ref: &str,
        text: &str,
        page_range: Option<&PageRange>,
    ) -> AppResult<LocateResult> {
        let request = SearchRequest {
            source_ref,
            text,
            page_start: page_range.map(|r| r.start),
            page_end: page_range.map(|r| r.end),
        };

        tracing::debug!(source_ref, text_len = text.len(), "Fuzzy-searching source document");

        let response = self
            .authorized(self.client.post(self.endpoint("documents/search")))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to reach locator: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Locator(format!(
                "Locator API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to parse locator response: {}", e)))
    }

    async fn access_url(&self, source_ref: &str) -> AppResult<String> {
        let response = self
            .authorized(self.client.post(self.endpoint("documents/access-url")))
            .json(&AccessUrlRequest { source_ref })
            .send()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to reach locator: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Locator(format!(
                "Locator API error ({})",
                response.status()
            )));
        }

        let body: AccessUrlResponse = response
            .json()
            .await
            .map_err(|e| AppError::Locator(format!("Failed to parse locator response: {}", e)))?;

        Ok(body.url)
    }
}
