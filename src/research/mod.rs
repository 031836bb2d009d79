//! 资料检索（Research Provider）
//!
//! research(topic) 的回退链：实时搜索（启用时）→ 语义存储（共享文档集合，再到本会话代码）→ 「未找到」哨兵。
//! 任何一步失败都只记日志，从不让流水线失败。

pub mod search;

use std::sync::Arc;

pub use search::{SearchError, SearchHit, TavilySearch, WebSearch};

use crate::config::ResearchSection;
use crate::core::text::truncate_chars;
use crate::memory::{CodeMemory, SemanticStore, StoreHit};

/// 三级回退都无结果时返回的文本
pub const NO_DOCS_FOUND: &str = "No documentation found.";

/// 搜索方式（CLI 标志 0 = 语义检索，1 = 实时搜索）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    Semantic,
    Live,
}

impl SearchMethod {
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "0" => Some(Self::Semantic),
            "1" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

pub struct ResearchProvider {
    web: Option<Arc<dyn WebSearch>>,
    store: Arc<dyn SemanticStore>,
    docs_collection: String,
    max_results: usize,
    max_result_chars: usize,
}

impl ResearchProvider {
    pub fn new(
        web: Option<Arc<dyn WebSearch>>,
        store: Arc<dyn SemanticStore>,
        cfg: &ResearchSection,
    ) -> Self {
        Self {
            web,
            store,
            docs_collection: cfg.docs_collection.clone(),
            max_results: cfg.max_results,
            max_result_chars: cfg.max_result_chars,
        }
    }

    /// 获取与 topic 相关的文档文本；session_id 用于在文档集合为空时回退查询本会话代码
    pub async fn research(
        &self,
        session_id: &str,
        topic: &str,
        use_live_search: bool,
        allowed_domains: &[String],
    ) -> String {
        let topic = topic.trim();
        if topic.is_empty() {
            return NO_DOCS_FOUND.to_string();
        }

        if use_live_search {
            if let Some(text) = self.live(topic, allowed_domains).await {
                return text;
            }
            tracing::warn!(topic = %topic, "live search unavailable, falling back to semantic store");
        }

        for collection in [self.docs_collection.clone(), CodeMemory::collection_name(session_id)] {
            match self.store.query(&collection, topic, self.max_results).await {
                Ok(hits) if !hits.is_empty() => return self.format_store_hits(&hits),
                Ok(_) => {}
                Err(e) => tracing::warn!(collection = %collection, error = %e, "semantic research failed"),
            }
        }

        NO_DOCS_FOUND.to_string()
    }

    async fn live(&self, topic: &str, allowed_domains: &[String]) -> Option<String> {
        let web = self.web.as_ref()?;
        let filter = (!allowed_domains.is_empty()).then_some(allowed_domains);
        match web.search(topic, self.max_results, filter).await {
            Ok(hits) if !hits.is_empty() => {
                let text = hits
                    .iter()
                    .map(|h| format!("Source: {}\n{}", h.url, h.content.trim()))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some(truncate_chars(&text, self.max_result_chars))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "live search failed");
                None
            }
        }
    }

    fn format_store_hits(&self, hits: &[StoreHit]) -> String {
        let text = hits
            .iter()
            .map(|h| format!("Source: {}\n{}", h.source, h.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        truncate_chars(&text, self.max_result_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Chunk, InMemorySemanticStore};
    use async_trait::async_trait;

    struct FailingSearch;

    #[async_trait]
    impl WebSearch for FailingSearch {
        async fn search(&self, _: &str, _: usize, _: Option<&[String]>) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Http(503))
        }
    }

    struct FixedSearch;

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(&self, _: &str, _: usize, filter: Option<&[String]>) -> Result<Vec<SearchHit>, SearchError> {
            assert_eq!(filter.map(|f| f.len()), Some(1));
            Ok(vec![SearchHit {
                url: "https://docs.python.org/x".into(),
                content: "use json.dumps".into(),
            }])
        }
    }

    async fn store_with_docs() -> Arc<InMemorySemanticStore> {
        let store = Arc::new(InMemorySemanticStore::new());
        store
            .upsert(
                "docs",
                "flask.md",
                vec![Chunk {
                    id: "flask.md#0".into(),
                    text: "Flask route decorators map URLs".into(),
                    source: "flask.md".into(),
                    offset: 0,
                }],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_live_search_preferred() {
        let provider = ResearchProvider::new(
            Some(Arc::new(FixedSearch)),
            store_with_docs().await,
            &ResearchSection::default(),
        );
        let text = provider.research("s", "json encoding", true, &["docs.python.org".into()]).await;
        assert!(text.contains("Source: https://docs.python.org/x"));
    }

    #[tokio::test]
    async fn test_live_failure_falls_back_to_store() {
        let provider = ResearchProvider::new(
            Some(Arc::new(FailingSearch)),
            store_with_docs().await,
            &ResearchSection::default(),
        );
        let text = provider.research("s", "flask route", true, &[]).await;
        assert!(text.contains("flask.md"));
    }

    #[tokio::test]
    async fn test_nothing_found_returns_sentinel() {
        let provider = ResearchProvider::new(
            None,
            Arc::new(InMemorySemanticStore::new()),
            &ResearchSection::default(),
        );
        assert_eq!(provider.research("s", "anything", false, &[]).await, NO_DOCS_FOUND);
    }

    #[test]
    fn test_search_method_flag() {
        assert_eq!(SearchMethod::from_flag("0"), Some(SearchMethod::Semantic));
        assert_eq!(SearchMethod::from_flag("1"), Some(SearchMethod::Live));
        assert_eq!(SearchMethod::from_flag("2"), None);
    }
}
