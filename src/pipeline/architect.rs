//! Architect：把计划拆成文件任务、依赖清单与测试计划
//!
//! 第一次调用（构建计划）失败是致命错误；第二次调用（QA 计划）失败只会得到空测试列表。

use crate::core::ForgeError;
use crate::llm::generate_structured;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{normalize_dependencies, ArchitectBuild, ArchitectQa, Task};
use crate::pipeline::Services;

pub const BUILD_FILE: &str = "architect_build.json";
pub const QA_FILE: &str = "architect_qa.json";

pub async fn run(state: &mut PipelineState, services: &Services) -> Result<(), ForgeError> {
    let plan_json = match &state.plan {
        Some(plan) => serde_json::to_string_pretty(plan)?,
        None => state.user_prompt.clone(),
    };

    let build_prompt = format!(
        "Break this plan into an ordered list of files to write. One task per file, in dependency \
         order (manifests and shared modules first). Paths are relative to the project root. \
         Include the dependency manifest (requirements.txt and/or package.json) as a task. \
         Give each task a short related_docs_topic naming the library or API it relies on.\n\n\
         Plan:\n{}",
        plan_json
    );
    let build: ArchitectBuild = generate_structured(services.llm.as_ref(), &build_prompt)
        .await
        .map_err(|e| ForgeError::generation("architect", e))?;
    state.session.write_plan_json(BUILD_FILE, &build).await?;

    let tasks: Vec<Task> = build
        .tasks
        .iter()
        .cloned()
        .map(Task::File)
        .filter(|t| {
            let ok = t.is_valid();
            if !ok {
                tracing::warn!(file = %t.file_name(), "dropping invalid file task");
            }
            ok
        })
        .collect();
    if tasks.is_empty() {
        tracing::warn!("architect produced no usable file tasks");
    }

    let file_list = tasks.iter().map(|t| t.file_name()).collect::<Vec<_>>().join("\n");
    let qa_prompt = format!(
        "Write a test plan for the files below. For each source file worth testing, give the test \
         file path, the target file it exercises and concrete scenarios. Use pytest for Python \
         and the project's npm test runner for JavaScript.\n\nPlan:\n{}\n\nFiles:\n{}",
        plan_json, file_list
    );
    let qa = match generate_structured::<ArchitectQa>(services.llm.as_ref(), &qa_prompt).await {
        Ok(qa) => qa,
        Err(e) => {
            tracing::warn!(error = %e, "QA planning failed, continuing without tests");
            ArchitectQa::default()
        }
    };
    state.session.write_plan_json(QA_FILE, &qa).await?;

    state.dependencies = normalize_dependencies(&build.dependencies);
    state.qa_tasks = qa.qa_tasks;
    state.queue.replace(tasks);
    tracing::info!(
        tasks = state.queue.len(),
        dependencies = state.dependencies.len(),
        qa_tasks = state.qa_tasks.len(),
        "architecture ready"
    );
    Ok(())
}
