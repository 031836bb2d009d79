//! 语义存储：按集合（collection）隔离的块存储与检索
//!
//! 对应外部接口 `upsert / delete / query`。InMemorySemanticStore 为进程内实现：
//! 配置了嵌入提供方时按余弦相似度检索，否则按代码分词的查询覆盖率检索；低于阈值的结果被丢弃。

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::EmbeddingProvider;
use crate::memory::rag::{cosine_similarity, Chunk};
use crate::memory::tokenizer::{coverage_score, tokenize_to_set};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// 检索命中
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub source: String,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// 写入某文件的块（不会先删除旧块，调用方负责 delete-then-upsert）
    async fn upsert(&self, collection: &str, file_path: &str, chunks: Vec<Chunk>) -> Result<(), StoreError>;

    /// 删除某文件的全部块
    async fn delete(&self, collection: &str, file_path: &str) -> Result<(), StoreError>;

    /// 检索最相关的 k 个块
    async fn query(&self, collection: &str, text: &str, k: usize) -> Result<Vec<StoreHit>, StoreError>;
}

struct Entry {
    chunk: Chunk,
    tokens: HashSet<String>,
    embedding: Option<Vec<f32>>,
}

/// 进程内语义存储
pub struct InMemorySemanticStore {
    collections: RwLock<HashMap<String, Vec<Entry>>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    min_similarity: f32,
}

impl Default for InMemorySemanticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySemanticStore {
    /// 关键词模式
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder: None,
            min_similarity: 0.0,
        }
    }

    /// 嵌入模式：余弦相似度低于 min_similarity 的结果被丢弃
    pub fn with_embedder(embedder: Arc<dyn EmbeddingProvider>, min_similarity: f32) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder: Some(embedder),
            min_similarity,
        }
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, StoreError> {
        match &self.embedder {
            Some(embedder) => embedder
                .embed(text)
                .await
                .map(Some)
                .map_err(|e| StoreError::Embedding(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    async fn upsert(&self, collection: &str, file_path: &str, chunks: Vec<Chunk>) -> Result<(), StoreError> {
        let mut entries = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            chunk.source = file_path.to_string();
            let embedding = self.embed(&chunk.text).await?;
            entries.push(Entry {
                tokens: tokenize_to_set(&chunk.text),
                chunk,
                embedding,
            });
        }
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn delete(&self, collection: &str, file_path: &str) -> Result<(), StoreError> {
        if let Some(entries) = self.collections.write().await.get_mut(collection) {
            entries.retain(|e| e.chunk.source != file_path);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, text: &str, k: usize) -> Result<Vec<StoreHit>, StoreError> {
        let query_embedding = self.embed(text).await?.filter(|v| !v.is_empty());
        let query_tokens = tokenize_to_set(text);

        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<StoreHit> = entries
            .iter()
            .filter_map(|entry| {
                let score = match (&query_embedding, &entry.embedding) {
                    (Some(q), Some(e)) => {
                        let s = cosine_similarity(q, e);
                        (s >= self.min_similarity).then_some(s)?
                    }
                    _ => coverage_score(&query_tokens, &entry.tokens),
                };
                (score > 0.0).then(|| StoreHit {
                    source: entry.chunk.source.clone(),
                    content: entry.chunk.text.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: "x#0".into(),
            text: text.into(),
            source: String::new(),
            offset: 0,
        }
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = InMemorySemanticStore::new();
        store.upsert("session_a", "app.py", vec![chunk("def alpha_handler(): pass")]).await.unwrap();
        store.upsert("session_b", "app.py", vec![chunk("def beta_handler(): pass")]).await.unwrap();

        let hits = store.query("session_a", "beta_handler", 5).await.unwrap();
        assert!(hits.is_empty());
        let hits = store.query("session_b", "beta_handler", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "app.py");
    }

    #[tokio::test]
    async fn test_delete_removes_only_that_file() {
        let store = InMemorySemanticStore::new();
        store.upsert("s", "a.py", vec![chunk("shared token one")]).await.unwrap();
        store.upsert("s", "b.py", vec![chunk("shared token two")]).await.unwrap();
        store.delete("s", "a.py").await.unwrap();
        let hits = store.query("s", "shared", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "b.py");
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let store = InMemorySemanticStore::new();
        assert!(store.query("nope", "anything", 3).await.unwrap().is_empty());
    }
}
