//! 后台索引池
//!
//! Coder 写完文件后提交索引任务即返回，不等待；并发由 Semaphore 限制（默认 3）。
//! 同一文件的多次提交按序号排队，旧任务晚于新任务完成时直接跳过，新内容始终胜出。
//! 失败只记日志，从不向流水线传播。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;

use crate::memory::CodeMemory;

/// 已应用到存储的最新序号（按 session + file 维度）
type AppliedSeq = Arc<AsyncMutex<u64>>;

pub struct BackgroundIndexer {
    memory: Arc<CodeMemory>,
    permits: Arc<Semaphore>,
    next_seq: AtomicU64,
    applied: Mutex<HashMap<String, AppliedSeq>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundIndexer {
    pub fn new(memory: Arc<CodeMemory>, workers: usize) -> Self {
        Self {
            memory,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            next_seq: AtomicU64::new(1),
            applied: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn memory(&self) -> &Arc<CodeMemory> {
        &self.memory
    }

    fn slot(&self, key: &str) -> AppliedSeq {
        match self.applied.lock() {
            Ok(mut map) => map.entry(key.to_string()).or_default().clone(),
            Err(poisoned) => poisoned.into_inner().entry(key.to_string()).or_default().clone(),
        }
    }

    /// 提交一个索引任务（立即返回）
    pub fn submit(&self, session_id: &str, file_path: &str, content: String) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let slot = self.slot(&format!("{}::{}", session_id, file_path));
        let memory = Arc::clone(&self.memory);
        let permits = Arc::clone(&self.permits);
        let session_id = session_id.to_string();
        let file_path = file_path.to_string();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let mut applied = slot.lock().await;
            if *applied > seq {
                tracing::debug!(file = %file_path, seq, "stale indexing job skipped");
                return;
            }
            match memory.update_file(&session_id, &file_path, &content).await {
                Ok(_) => *applied = seq,
                Err(e) => tracing::warn!(file = %file_path, error = %e, "background indexing failed"),
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// 等待所有已提交任务完成（运行结束或测试时调用）
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "indexing task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySection;
    use crate::memory::InMemorySemanticStore;

    #[tokio::test]
    async fn test_latest_submission_wins() {
        let memory = Arc::new(CodeMemory::new(
            Arc::new(InMemorySemanticStore::new()),
            &MemorySection::default(),
        ));
        let indexer = BackgroundIndexer::new(memory.clone(), 2);

        indexer.submit("s", "app.py", "def first_version_marker(): pass".to_string());
        indexer.submit("s", "app.py", "def second_version_marker(): pass".to_string());
        indexer.flush().await;

        assert!(memory.query("s", "first_version_marker", 5).await.unwrap().is_empty());
        assert_eq!(memory.query("s", "second_version_marker", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending() {
        let memory = Arc::new(CodeMemory::new(
            Arc::new(InMemorySemanticStore::new()),
            &MemorySection::default(),
        ));
        BackgroundIndexer::new(memory, 1).flush().await;
    }
}
