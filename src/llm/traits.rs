//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Scripted）实现 LlmClient::complete；
//! 流水线各节点只依赖该 trait，便于在测试中替换为脚本化实现。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::llm::Message;

/// 生成能力的失败类型
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// 结构化输出无法解析为目标 schema
    #[error("Structured output did not match schema: {0}")]
    Schema(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条候选的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 本客户端累计的 token 用量；不计费的实现返回零
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// 累计 token 用量快照，随运行报告输出
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}
