//! 沙箱：隔离的代码安装 / 测试环境
//!
//! - **Sandbox / SandboxProvider**: 连接已有沙箱或按模板新建；写文件、带超时执行命令
//! - **registry**: session_id → sandbox_id 的持久化映射，用于复用环境
//! - **runtime**: 根据已生成文件的扩展名选择运行模板
//! - **local**: 基于本地目录 + `sh -c` 的默认实现
//! - **memory**: 规则驱动的内存替身（测试用）

pub mod local;
pub mod memory;
pub mod registry;
pub mod runtime;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalSandboxProvider;
pub use memory::InMemorySandboxProvider;
pub use registry::SandboxRegistry;
pub use runtime::{select_runtime, RuntimeTemplate};

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox {0} unavailable: {1}")]
    Connect(String, String),
    #[error("Sandbox creation failed: {0}")]
    Create(String),
    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command timed out after {0}s")]
    Timeout(u64),
    #[error("Command failed to start: {0}")]
    Command(String),
}

/// 命令执行结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout 与 stderr 合并（用于日志）
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
        }
    }
}

/// 已连接的沙箱句柄
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    /// 写入沙箱内相对路径（父目录自动创建）
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), SandboxError>;

    /// 执行命令；background=true 时启动后立即返回 exit_code 0
    async fn run(&self, cmd: &str, timeout: Duration, background: bool) -> Result<CommandOutput, SandboxError>;
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError>;

    async fn create(&self, template: RuntimeTemplate) -> Result<Box<dyn Sandbox>, SandboxError>;
}
