//! 文本嵌入：语义代码记忆的可选向量后端
//!
//! 未配置 `llm.embedding_model` 或没有 OPENAI_API_KEY 时不创建嵌入器，存储退回关键词打分。

use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::LlmSection;
use crate::llm::LlmError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 空白文本返回空向量，不发请求
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, timeout_secs: u64) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;
        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Api(e.to_string()))?;
        Ok(response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .unwrap_or_default())
    }
}

pub fn create_embedder_from_config(cfg: &LlmSection) -> Option<Arc<dyn EmbeddingProvider>> {
    let model = cfg.embedding_model.as_deref().filter(|m| !m.is_empty())?;
    let Some(key) = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) else {
        tracing::warn!(model, "embedding model configured but OPENAI_API_KEY is missing");
        return None;
    };
    Some(Arc::new(OpenAiEmbedder::new(
        cfg.base_url.as_deref(),
        model,
        &key,
        cfg.request_timeout_secs,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_model_means_no_embedder() {
        let cfg = LlmSection::default();
        assert!(create_embedder_from_config(&cfg).is_none());
    }

    #[tokio::test]
    async fn test_blank_text_skips_request() {
        let embedder = OpenAiEmbedder::new(Some("http://127.0.0.1:9"), "text-embedding-3-small", "sk-test", 1);
        assert!(embedder.embed("   \n").await.unwrap().is_empty());
    }
}
