//! 会话级语义代码记忆
//!
//! 每个会话一个集合（`session_<id>`）；update_file 对单个文件先删除旧块再写入新块，
//! 文件被重写后旧内容不会残留在检索结果中。

use std::sync::Arc;

use crate::config::MemorySection;
use crate::memory::rag::{Chunker, ChunkingConfig};
use crate::memory::store::{SemanticStore, StoreError, StoreHit};

pub struct CodeMemory {
    store: Arc<dyn SemanticStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CodeMemory {
    pub fn new(store: Arc<dyn SemanticStore>, config: &MemorySection) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn collection_name(session_id: &str) -> String {
        format!("session_{}", session_id)
    }

    pub fn store(&self) -> &Arc<dyn SemanticStore> {
        &self.store
    }

    /// 单文件重建索引：删除旧块 → 按语言分块 → 写入；返回写入的块数
    pub async fn update_file(&self, session_id: &str, file_path: &str, content: &str) -> Result<usize, StoreError> {
        let collection = Self::collection_name(session_id);
        if let Err(e) = self.store.delete(&collection, file_path).await {
            tracing::debug!(file = %file_path, error = %e, "delete before re-index failed");
        }

        let config = ChunkingConfig::for_file(file_path, self.chunk_size, self.chunk_overlap);
        let chunks = Chunker::new(config).chunk(file_path, content);
        let count = chunks.len();
        if count > 0 {
            self.store.upsert(&collection, file_path, chunks).await?;
            tracing::debug!(file = %file_path, chunks = count, "memory updated");
        }
        Ok(count)
    }

    /// 检索本会话代码
    pub async fn query(&self, session_id: &str, text: &str, k: usize) -> Result<Vec<StoreHit>, StoreError> {
        self.store.query(&Self::collection_name(session_id), text, k).await
    }

    /// 检索并格式化为 `## FILE: <source>` 段落
    pub async fn query_codebase(&self, session_id: &str, text: &str, k: usize) -> Result<String, StoreError> {
        let hits = self.query(session_id, text, k).await?;
        Ok(hits
            .iter()
            .map(|h| format!("## FILE: {}\n{}", h.source, h.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySemanticStore;

    fn memory() -> CodeMemory {
        CodeMemory::new(Arc::new(InMemorySemanticStore::new()), &MemorySection::default())
    }

    #[tokio::test]
    async fn test_update_file_replaces_previous_version() {
        let mem = memory();
        mem.update_file("s1", "app.py", "def legacy_checkout_flow():\n    return 'old'\n")
            .await
            .unwrap();
        mem.update_file("s1", "app.py", "def shiny_payment_pipeline():\n    return 'new'\n")
            .await
            .unwrap();

        assert!(mem.query("s1", "legacy_checkout_flow", 5).await.unwrap().is_empty());
        let hits = mem.query("s1", "shiny_payment_pipeline", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("return 'new'"));
    }

    #[tokio::test]
    async fn test_query_codebase_format() {
        let mem = memory();
        mem.update_file("s1", "src/util.js", "export function slugify(text) { return text; }")
            .await
            .unwrap();
        let ctx = mem.query_codebase("s1", "slugify", 3).await.unwrap();
        assert!(ctx.starts_with("## FILE: src/util.js"));
    }
}
