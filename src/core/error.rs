//! 流水线致命错误
//!
//! 只有这里列出的错误会中止一次运行；执行/测试失败不走错误通道，而是变成 ExecutionResult 交给 Evaluator。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum ForgeError {
    /// Planner / Architect 生成失败（不重试）
    #[error("{node} generation failed: {source}")]
    Generation {
        node: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("Session I/O error: {0}")]
    SessionIo(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Step limit of {0} reached before the run terminated")]
    StepLimit(usize),
}

impl ForgeError {
    pub fn generation(node: &'static str, source: LlmError) -> Self {
        Self::Generation { node, source }
    }
}
