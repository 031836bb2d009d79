//! Debugger：把错误 + 上下文变成一组有范围的修复任务
//!
//! 上下文：代码文件按修改时间从新到旧排序；优先选取文件名直接出现在错误文本中的文件，
//! 否则回退到最近修改的若干文件（内容截断），即使错误里没有文件名也保证有上下文。
//! 生成失败时为每个上下文文件生成一条携带原始错误的修复任务，循环始终有活可干。
//! 每次输出都整体替换队列并把游标归零，error_report 保持不变（Coder 重新进入 fix 模式）。

use crate::core::text::truncate_chars;
use crate::core::ForgeError;
use crate::llm::generate_structured;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{AttemptHistory, DebugTask, RepairPlan, Task};
use crate::pipeline::workspace::{list_code_files, CodeFile};
use crate::pipeline::Services;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextFile {
    pub relative: String,
    pub content: String,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// `needle` 在 `text` 中以路径分量边界出现（前面不是文件名字符，后面不是标识符字符）
pub fn mentions_path(text: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    text.match_indices(needle).any(|(i, _)| {
        let before_ok = text[..i].chars().next_back().map_or(true, |c| !is_name_char(c));
        let after_ok = text[i + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        before_ok && after_ok
    })
}

/// 选出上下文文件：错误文本中提到的优先，否则取最近修改的 max_files 个
///
/// 相对路径按分量边界匹配；仅凭文件名匹配只在文件名在树中唯一时成立（`__init__.py` 之类必须带目录）。
pub fn select_context(mut files: Vec<CodeFile>, error: &str, max_files: usize) -> Vec<CodeFile> {
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.relative.cmp(&b.relative)));
    let base = |f: &CodeFile| f.relative.rsplit('/').next().unwrap_or(&f.relative).to_string();
    let mentioned: Vec<CodeFile> = files
        .iter()
        .filter(|f| {
            let name = base(f);
            let unique = files.iter().filter(|o| base(o) == name).count() == 1;
            mentions_path(error, &f.relative) || (unique && mentions_path(error, &name))
        })
        .cloned()
        .collect();
    let mut chosen = if mentioned.is_empty() { files } else { mentioned };
    chosen.truncate(max_files.max(1));
    chosen
}

async fn gather_context(state: &PipelineState, error: &str, services: &Services) -> Vec<ContextFile> {
    let cfg = &services.config.pipeline;
    let files = list_code_files(&state.session.code_dir());
    let mut context = Vec::new();
    for file in select_context(files, error, cfg.debug_context_files) {
        match tokio::fs::read_to_string(&file.path).await {
            Ok(content) => context.push(ContextFile {
                relative: file.relative,
                content: truncate_chars(&content, cfg.debug_context_chars),
            }),
            Err(e) => tracing::debug!(file = %file.relative, error = %e, "context file unreadable"),
        }
    }
    context
}

fn previous_attempts(history: &AttemptHistory) -> String {
    if history.is_empty() {
        return "None".to_string();
    }
    history
        .records()
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Attempt {}: error: {}\n  fix tried: {}", i + 1, r.error, r.plan_summary))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn plan_summary(tasks: &[DebugTask]) -> String {
    tasks
        .iter()
        .map(|t| format!("{}: {}", t.file_name, t.task_description))
        .collect::<Vec<_>>()
        .join("; ")
}

fn fallback_tasks(context: &[ContextFile], error: &str) -> Vec<DebugTask> {
    context
        .iter()
        .map(|c| DebugTask {
            file_name: c.relative.clone(),
            bug_analysis: "Automatic repair plan unavailable; the raw error is attached.".to_string(),
            task_description: format!("Fix this file so the following error no longer occurs:\n{}", error),
            related_docs_topic: String::new(),
        })
        .collect()
}

pub async fn run(state: &mut PipelineState, services: &Services) -> Result<(), ForgeError> {
    let error = match state.error_report.clone().filter(|e| !e.trim().is_empty()) {
        Some(e) => e,
        None => {
            // 直接进入 debug 路由：用户请求即错误描述
            state.error_report = Some(state.user_prompt.clone());
            state.user_prompt.clone()
        }
    };
    let category = state.error_category;
    let context = gather_context(state, &error, services).await;
    tracing::info!(
        category = ?category,
        context_files = context.len(),
        attempts = state.attempt_history.len(),
        "debugging"
    );

    let context_text = context
        .iter()
        .map(|c| format!("## FILE: {}\n{}", c.relative, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = format!(
        "Produce an ordered repair plan for the failure below. One task per file to change; use the \
         exact file paths shown.\n\n\
         Error category: {cat:?}\nFocus: {focus}\n\n\
         Error report:\n{error}\n\n\
         Previous attempts (do not repeat a strategy that already failed):\n{previous}\n\n\
         Relevant files:\n{context_text}",
        cat = category,
        focus = category.focus(),
        previous = previous_attempts(&state.attempt_history),
    );

    let tasks: Vec<DebugTask> = match generate_structured::<RepairPlan>(services.llm.as_ref(), &prompt).await {
        Ok(plan) => plan
            .tasks
            .into_iter()
            .filter(|t| Task::Debug(t.clone()).is_valid())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "repair planning failed, using per-file fallback");
            Vec::new()
        }
    };
    let tasks = if tasks.is_empty() {
        fallback_tasks(&context, &error)
    } else {
        tasks
    };

    let summary = plan_summary(&tasks);
    let repeated = state
        .attempt_history
        .last()
        .is_some_and(|last| last.plan_summary == summary);
    state.attempt_history.push(
        truncate_chars(&error, services.config.pipeline.error_truncate_chars),
        summary,
    );

    let plan = RepairPlan { tasks: tasks.clone() };
    state.session.write_fix_plan(state.iteration_count, &plan).await?;

    if repeated {
        tracing::warn!("repair plan repeats the previous attempt");
        if services.config.pipeline.stop_on_repeated_fix {
            state.stop_reason = Some("repair plan repeated the previous attempt".to_string());
        }
    }

    state.queue.replace(tasks.into_iter().map(Task::Debug).collect());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn file(rel: &str, age_secs: u64) -> CodeFile {
        CodeFile {
            relative: rel.into(),
            path: rel.into(),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        }
    }

    #[test]
    fn test_mentioned_files_preferred() {
        let files = vec![file("app.py", 10), file("utils/helpers.py", 100), file("models.py", 1)];
        let chosen = select_context(files, "File \"/sandbox/utils/helpers.py\", line 3", 3);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].relative, "utils/helpers.py");
    }

    #[test]
    fn test_mention_respects_path_boundaries() {
        let files = vec![file("app.py", 10), file("myapp.py", 20)];
        let chosen = select_context(files, "Traceback: File \"myapp.py\", line 1", 3);
        let names: Vec<_> = chosen.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["myapp.py"]);

        assert!(mentions_path("File \"/sandbox/app.py\", line 2", "app.py"));
        assert!(!mentions_path("see myapp.py", "app.py"));
        assert!(!mentions_path("app.pyc is stale", "app.py"));
    }

    #[test]
    fn test_shared_basename_needs_directory() {
        let files = vec![file("api/__init__.py", 5), file("models/__init__.py", 50), file("models/user.py", 40)];
        let chosen = select_context(files, "File \"/sandbox/models/__init__.py\", line 4", 3);
        let names: Vec<_> = chosen.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["models/__init__.py"]);
    }

    #[test]
    fn test_falls_back_to_newest() {
        let files = vec![file("a.py", 30), file("b.py", 10), file("c.py", 20), file("d.py", 40)];
        let chosen = select_context(files, "Segmentation fault", 2);
        let names: Vec<_> = chosen.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["b.py", "c.py"]);
    }

    #[test]
    fn test_fallback_tasks_carry_error() {
        let ctx = vec![ContextFile {
            relative: "app.py".into(),
            content: String::new(),
        }];
        let tasks = fallback_tasks(&ctx, "NameError: x");
        assert_eq!(tasks[0].file_name, "app.py");
        assert!(tasks[0].task_description.contains("NameError: x"));
    }
}
