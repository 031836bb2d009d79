//! QA：首轮（iteration 0）为每个测试任务生成测试文件；单个失败只记日志

use crate::core::text::strip_code_fences;
use crate::core::{write_atomic, ForgeError};
use crate::llm::Message;
use crate::pipeline::state::PipelineState;
use crate::pipeline::workspace::resolve_target;
use crate::pipeline::Services;

const QA_SYSTEM: &str = "You are a test engineer. Output only the complete test file. \
Tests must run non-interactively and finish quickly.";

pub async fn run(state: &mut PipelineState, services: &Services) -> Result<(), ForgeError> {
    let qa_tasks = state.qa_tasks.clone();
    tracing::info!(tests = qa_tasks.len(), "generating tests");

    for qa in qa_tasks {
        let test_target = match resolve_target(&state.session, &qa.test_file_name) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = %qa.test_file_name, error = %e, "skipping test with invalid path");
                continue;
            }
        };
        let source = match resolve_target(&state.session, &qa.target_file) {
            Ok(t) => tokio::fs::read_to_string(&t.path).await.unwrap_or_default(),
            Err(_) => String::new(),
        };

        let scenarios = qa
            .test_scenarios
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Write the test file {test} for {target}.\n\nScenarios:\n{scenarios}\n\n\
             Source of {target}:\n{source}",
            test = test_target.relative,
            target = qa.target_file,
        );
        let messages = [Message::system(QA_SYSTEM), Message::user(prompt)];

        match services.llm.complete(&messages).await {
            Ok(reply) => {
                let content = strip_code_fences(&reply);
                write_atomic(&test_target.path, content.as_bytes()).await?;
                services.indexer.submit(state.session.id(), &test_target.relative, content);
                state.mark_completed(&test_target.relative);
            }
            Err(e) => {
                tracing::warn!(file = %test_target.relative, error = %e, "test generation failed, skipping");
            }
        }
    }
    Ok(())
}
