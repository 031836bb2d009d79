//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）、结构化生成、嵌入

pub mod embedding;
pub mod message;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

use std::sync::Arc;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use message::{Message, Role};
pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, DEEPSEEK_CHAT, DEFAULT_OPENAI_MODEL};
pub use structured::{extract_json, generate_structured, response_schema};
pub use traits::{LlmClient, LlmError, TokenUsage};

use crate::config::AppConfig;
use crate::core::ForgeError;

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容）；没有可用 Key 时报配置错误
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, ForgeError> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), deepseek_key, openai_key) {
        ("deepseek", Some(key), _) | ("deepseek", None, Some(key)) => {
            let model = cfg.llm.model.as_deref();
            tracing::info!(model = model.unwrap_or(DEEPSEEK_CHAT), "using DeepSeek LLM");
            Ok(Arc::new(
                OpenAiClient::deepseek(&key, model).with_timeout(cfg.llm.request_timeout_secs),
            ))
        }
        (_, _, Some(key)) => {
            let model = cfg.llm.model.clone().unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
            tracing::info!(model = %model, "using OpenAI-compatible LLM");
            Ok(Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, &key)
                    .with_timeout(cfg.llm.request_timeout_secs),
            ))
        }
        _ => Err(ForgeError::Config(
            "no LLM API key found (set OPENAI_API_KEY or DEEPSEEK_API_KEY)".to_string(),
        )),
    }
}
