//! 实时网页搜索：Tavily 风格 JSON API
//!
//! POST {api_url}，请求体含 query、max_results 与可选 include_domains；响应 `results[]` 取 url + content。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ResearchSection;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search not configured: {0}")]
    NotConfigured(String),
    #[error("Search request failed: {0}")]
    Request(String),
    #[error("Search HTTP {0}")]
    Http(u16),
}

/// 单条搜索结果
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        domain_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_domains: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct TavilySearch {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl TavilySearch {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// API Key 从 `research.api_key_env` 指定的环境变量读取
    pub fn from_config(cfg: &ResearchSection) -> Self {
        Self::new(
            cfg.search_api_url.clone(),
            std::env::var(&cfg.api_key_env).ok(),
            cfg.timeout_secs,
        )
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        domain_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::NotConfigured("missing search API key".to_string()))?;

        let body = SearchRequest {
            api_key,
            query,
            max_results,
            include_domains: domain_filter.filter(|d| !d.is_empty()),
        };

        tracing::info!(query = %query, "live search");
        let resp = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SearchError::Http(resp.status().as_u16()));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        Ok(parsed.results)
    }
}
