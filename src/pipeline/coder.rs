//! Coder：每一步只处理队列中的一个任务
//!
//! 解析目标路径 → 读取现有内容 → 选择模式（有错误报告且文件存在时为 fix，否则 build）→ 生成 →
//! 去代码围栏 → 原子写入 → 提交后台索引（不等待）→ 游标前进并记录完成文件。
//! 单个任务生成失败只跳过该任务。

use crate::core::text::strip_code_fences;
use crate::core::{write_atomic, ForgeError};
use crate::llm::Message;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::Task;
use crate::pipeline::workspace::resolve_target;
use crate::pipeline::Services;

const CODER_SYSTEM: &str = "You are an expert software engineer. Output only the complete content \
of the requested file. No explanations, no Markdown outside the file content.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderMode {
    Build,
    Fix,
}

pub fn select_mode(error_report: Option<&str>, file_exists: bool) -> CoderMode {
    match error_report {
        Some(report) if !report.trim().is_empty() && file_exists => CoderMode::Fix,
        _ => CoderMode::Build,
    }
}

fn build_prompt(state: &PipelineState, task: &Task, docs: &str) -> String {
    let goal = state
        .plan
        .as_ref()
        .map(|p| p.project_goal.as_str())
        .unwrap_or(state.user_prompt.as_str());
    format!(
        "Project goal: {goal}\n\
         File to write: {file}\n\
         Task: {desc}\n\n\
         Other files in the project: {files}\n\n\
         Reference documentation:\n{docs}",
        file = task.file_name(),
        desc = task.description(),
        files = state
            .queue
            .tasks()
            .iter()
            .map(|t| t.file_name())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn fix_prompt(task: &Task, existing: &str, error: &str, docs: &str) -> String {
    let analysis = task
        .bug_analysis()
        .map(|a| format!("Bug analysis: {}\n", a))
        .unwrap_or_default();
    format!(
        "Fix the file {file}.\n\
         {analysis}Repair instructions: {desc}\n\n\
         Error report:\n{error}\n\n\
         Current content:\n{existing}\n\n\
         Reference documentation:\n{docs}\n\n\
         Return the full corrected file.",
        file = task.file_name(),
        desc = task.description(),
    )
}

pub async fn run(state: &mut PipelineState, services: &Services) -> Result<(), ForgeError> {
    let Some(task) = state.queue.current().cloned() else {
        return Ok(());
    };

    let target = match resolve_target(&state.session, task.file_name()) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(file = %task.file_name(), error = %e, "skipping task with invalid path");
            state.queue.advance();
            return Ok(());
        }
    };

    let existing = tokio::fs::read_to_string(&target.path).await.ok();
    let mode = select_mode(state.error_report.as_deref(), existing.is_some());
    tracing::info!(
        file = %target.relative,
        mode = ?mode,
        cursor = state.queue.cursor(),
        total = state.queue.len(),
        "coding"
    );

    let docs = if task.docs_topic().trim().is_empty() {
        String::new()
    } else {
        services
            .research
            .research(
                state.session.id(),
                task.docs_topic(),
                state.search_method.is_live(),
                &services.config.research.allowed_domains,
            )
            .await
    };

    let prompt = match (mode, existing.as_deref()) {
        (CoderMode::Fix, Some(content)) => {
            fix_prompt(&task, content, state.error_report.as_deref().unwrap_or_default(), &docs)
        }
        _ => build_prompt(state, &task, &docs),
    };
    let messages = [Message::system(CODER_SYSTEM), Message::user(prompt)];

    match services.llm.complete(&messages).await {
        Ok(reply) => {
            let content = strip_code_fences(&reply);
            write_atomic(&target.path, content.as_bytes()).await?;
            services.indexer.submit(state.session.id(), &target.relative, content);
            state.mark_completed(&target.relative);
        }
        Err(e) => {
            tracing::warn!(file = %target.relative, error = %e, "generation failed, skipping task");
        }
    }

    state.queue.advance();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_mode() {
        assert_eq!(select_mode(None, true), CoderMode::Build);
        assert_eq!(select_mode(Some("boom"), false), CoderMode::Build);
        assert_eq!(select_mode(Some("boom"), true), CoderMode::Fix);
        assert_eq!(select_mode(Some("  "), true), CoderMode::Build);
    }
}
