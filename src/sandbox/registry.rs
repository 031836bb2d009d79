//! 沙箱注册表：单个 JSON 对象 `{ session_id: sandbox_id }`
//!
//! 每次登记都是读-改-写；同一 session 最多映射一个 sandbox（后写覆盖）。
//! 文件损坏或不存在时按空表处理，查询失败不会中断流水线。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::sync::Mutex;

use crate::core::write_atomic;

#[derive(Debug)]
pub struct SandboxRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SandboxRegistry {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> BTreeMap<String, String> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(_) => return BTreeMap::new(),
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "sandbox registry unreadable, treating as empty");
            BTreeMap::new()
        })
    }

    /// 查询会话绑定的沙箱 id
    pub async fn get(&self, session_id: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.load().await.get(session_id).cloned()
    }

    /// 登记（或覆盖）会话的沙箱 id
    pub async fn register(&self, session_id: &str, sandbox_id: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await;
        map.insert(session_id.to_string(), sandbox_id.to_string());
        let json = serde_json::to_string_pretty(&map)?;
        write_atomic(&self.path, json.as_bytes())
            .await
            .with_context(|| format!("writing sandbox registry {}", self.path.display()))?;
        tracing::info!(session = %session_id, sandbox = %sandbox_id, "sandbox registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SandboxRegistry::new(dir.path().join("active_sandboxes.json"));
        assert_eq!(registry.get("s1").await, None);

        registry.register("s1", "sbx-a").await.unwrap();
        registry.register("s2", "sbx-b").await.unwrap();
        assert_eq!(registry.get("s1").await.as_deref(), Some("sbx-a"));
        assert_eq!(registry.get("s2").await.as_deref(), Some("sbx-b"));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SandboxRegistry::new(dir.path().join("reg.json"));
        registry.register("s1", "sbx-old").await.unwrap();
        registry.register("s1", "sbx-new").await.unwrap();
        assert_eq!(registry.get("s1").await.as_deref(), Some("sbx-new"));

        let raw = std::fs::read_to_string(registry.path()).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.json");
        std::fs::write(&path, "{not json").unwrap();
        let registry = SandboxRegistry::new(&path);
        assert_eq!(registry.get("s1").await, None);
        registry.register("s1", "sbx-a").await.unwrap();
        assert_eq!(registry.get("s1").await.as_deref(), Some("sbx-a"));
    }
}
