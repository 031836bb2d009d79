//! 结构化生成：schemars 生成响应 Schema 注入 prompt，再从回复中提取 JSON 解析为目标类型
//!
//! 对应外部接口 `invoke(structured_prompt, response_schema) -> schema_instance | fails`。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::llm::{LlmClient, LlmError, Message};

const JSON_ONLY_SYSTEM: &str = "You are a precise software engineering agent. \
Reply with a single valid JSON object that conforms to the provided JSON schema. \
Do not add prose before or after the JSON.";

/// 返回类型 T 的 JSON Schema 字符串
pub fn response_schema<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 从 LLM 输出中提取 JSON（```json ... ``` 代码块或首个 `{` 到末个 `}`）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 按 schema 调用生成能力并解析；无法解析时返回 LlmError::Schema
pub async fn generate_structured<T>(llm: &dyn LlmClient, prompt: &str) -> Result<T, LlmError>
where
    T: JsonSchema + DeserializeOwned,
{
    let full_prompt = format!(
        "{prompt}\n\nRespond with JSON matching this schema:\n{}",
        response_schema::<T>()
    );
    let messages = [Message::system(JSON_ONLY_SYSTEM), Message::user(full_prompt)];
    let output = llm.complete(&messages).await?;

    let json = extract_json(&output)
        .ok_or_else(|| LlmError::Schema(format!("no JSON object in reply: {}", preview(&output))))?;
    serde_json::from_str(json).map_err(|e| LlmError::Schema(format!("{}: {}", e, preview(json))))
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Route {
        route: String,
    }

    #[test]
    fn test_extract_json_fenced_and_bare() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("sure: {\"a\":1} done"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_generate_structured_parses_reply() {
        let llm = ScriptedLlmClient::new().reply(r#"{"route": "debug"}"#);
        let parsed: Route = generate_structured(&llm, "classify").await.unwrap();
        assert_eq!(parsed.route, "debug");
        assert!(llm.prompts()[0].contains("schema"));
    }

    #[tokio::test]
    async fn test_generate_structured_schema_mismatch() {
        let llm = ScriptedLlmClient::new().reply(r#"{"other": 1}"#);
        let result: Result<Route, _> = generate_structured(&llm, "classify").await;
        assert!(matches!(result, Err(LlmError::Schema(_))));
    }
}
