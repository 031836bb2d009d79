//! 内存沙箱（测试替身）
//!
//! 命令按子串规则返回预设退出码与输出，未命中任何规则时成功；记录连接、创建与执行过的命令，便于断言。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::sandbox::{CommandOutput, RuntimeTemplate, Sandbox, SandboxError, SandboxProvider};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    exit_code: i32,
    output: String,
    timeout: bool,
}

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<Rule>,
    live: BTreeSet<String>,
    files: BTreeMap<(String, String), Vec<u8>>,
    commands: Vec<String>,
    connects: Vec<String>,
    created: Vec<(String, RuntimeTemplate)>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySandboxProvider {
    inner: Arc<Mutex<Inner>>,
}

impl InMemorySandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命令包含 pattern 时返回 exit_code 与 output
    pub fn with_rule(self, pattern: impl Into<String>, exit_code: i32, output: impl Into<String>) -> Self {
        self.push_rule(Rule {
            pattern: pattern.into(),
            exit_code,
            output: output.into(),
            timeout: false,
        });
        self
    }

    /// 命令包含 pattern 时超时
    pub fn with_timeout(self, pattern: impl Into<String>) -> Self {
        self.push_rule(Rule {
            pattern: pattern.into(),
            exit_code: 0,
            output: String::new(),
            timeout: true,
        });
        self
    }

    /// 预置一个可重连的沙箱
    pub fn with_existing(self, id: impl Into<String>) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.live.insert(id.into());
        }
        self
    }

    fn push_rule(&self, rule: Rule) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rules.push(rule);
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Option<T> {
        self.inner.lock().ok().map(|inner| f(&inner))
    }

    pub fn commands(&self) -> Vec<String> {
        self.read(|i| i.commands.clone()).unwrap_or_default()
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.read(|i| i.connects.clone()).unwrap_or_default()
    }

    pub fn created(&self) -> Vec<(String, RuntimeTemplate)> {
        self.read(|i| i.created.clone()).unwrap_or_default()
    }

    /// 某沙箱内的文件内容
    pub fn file(&self, sandbox_id: &str, path: &str) -> Option<Vec<u8>> {
        self.read(|i| i.files.get(&(sandbox_id.to_string(), path.to_string())).cloned())
            .flatten()
    }
}

#[async_trait]
impl SandboxProvider for InMemorySandboxProvider {
    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SandboxError::Connect(id.to_string(), "state poisoned".to_string()))?;
        inner.connects.push(id.to_string());
        if !inner.live.contains(id) {
            return Err(SandboxError::Connect(id.to_string(), "expired".to_string()));
        }
        Ok(Box::new(InMemorySandbox {
            id: id.to_string(),
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn create(&self, template: RuntimeTemplate) -> Result<Box<dyn Sandbox>, SandboxError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SandboxError::Create("state poisoned".to_string()))?;
        let id = format!("mem-{}", inner.created.len() + 1);
        inner.live.insert(id.clone());
        inner.created.push((id.clone(), template));
        Ok(Box::new(InMemorySandbox {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

pub struct InMemorySandbox {
    id: String,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Sandbox for InMemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), SandboxError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SandboxError::Command("state poisoned".to_string()))?;
        inner.files.insert((self.id.clone(), path.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn run(&self, cmd: &str, timeout: Duration, _background: bool) -> Result<CommandOutput, SandboxError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SandboxError::Command("state poisoned".to_string()))?;
        inner.commands.push(cmd.to_string());
        let rule = inner.rules.iter().find(|r| cmd.contains(&r.pattern)).cloned();
        match rule {
            Some(r) if r.timeout => Err(SandboxError::Timeout(timeout.as_secs())),
            Some(r) => Ok(CommandOutput {
                stdout: r.output,
                stderr: String::new(),
                exit_code: r.exit_code,
            }),
            None => Ok(CommandOutput {
                stdout: "ok".to_string(),
                stderr: String::new(),
                exit_code: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_and_records() {
        let provider = InMemorySandboxProvider::new()
            .with_rule("pytest", 1, "AssertionError")
            .with_existing("old");
        assert!(provider.connect("gone").await.is_err());
        let sbx = provider.connect("old").await.unwrap();
        sbx.write("app.py", b"print(1)").await.unwrap();
        let out = sbx.run("python -m pytest", Duration::from_secs(1), false).await.unwrap();
        assert_eq!(out.exit_code, 1);
        assert_eq!(provider.connect_attempts(), vec!["gone", "old"]);
        assert_eq!(provider.file("old", "app.py").as_deref(), Some(&b"print(1)"[..]));
    }
}
