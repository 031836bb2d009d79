//! 流水线状态与最终报告
//!
//! PipelineState 由 Orchestrator 独占并按节点顺序依次修改；RunReport 是运行结束时的可序列化投影。

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::Session;
use crate::llm::TokenUsage;
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::types::{
    AttemptHistory, ErrorCategory, EvalStatus, ExecutionResult, Plan, QaTask, Route,
};
use crate::research::SearchMethod;

#[derive(Debug)]
pub struct PipelineState {
    pub session: Session,
    pub user_prompt: String,
    pub search_method: SearchMethod,
    pub route: Route,
    pub plan: Option<Plan>,
    pub queue: TaskQueue,
    pub dependencies: BTreeSet<String>,
    /// 规划了但没有任何清单声明的依赖（依赖校验时刷新）
    pub undeclared_dependencies: Vec<String>,
    pub qa_tasks: Vec<QaTask>,
    pub completed_files: Vec<String>,
    pub execution_result: Option<ExecutionResult>,
    pub iteration_count: u32,
    pub error_report: Option<String>,
    pub error_category: ErrorCategory,
    pub status: EvalStatus,
    pub attempt_history: AttemptHistory,
    pub sandbox_id: Option<String>,
    /// 提前结束的原因（例如修复计划重复）
    pub stop_reason: Option<String>,
    /// Learner 的输出
    pub answer: Option<String>,
}

impl PipelineState {
    pub fn new(session: Session, user_prompt: impl Into<String>, search_method: SearchMethod) -> Self {
        Self {
            session,
            user_prompt: user_prompt.into(),
            search_method,
            route: Route::default(),
            plan: None,
            queue: TaskQueue::default(),
            dependencies: BTreeSet::new(),
            undeclared_dependencies: Vec::new(),
            qa_tasks: Vec::new(),
            completed_files: Vec::new(),
            execution_result: None,
            iteration_count: 0,
            error_report: None,
            error_category: ErrorCategory::None,
            status: EvalStatus::Pending,
            attempt_history: AttemptHistory::default(),
            sandbox_id: None,
            stop_reason: None,
            answer: None,
        }
    }

    /// 记录已完成文件（保持首次出现的顺序，不重复）
    pub fn mark_completed(&mut self, relative: &str) {
        if !self.completed_files.iter().any(|f| f == relative) {
            self.completed_files.push(relative.to_string());
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            session_id: self.session.id().to_string(),
            route: self.route,
            status: self.status,
            iteration_count: self.iteration_count,
            error_category: self.error_category,
            error_report: self.error_report.clone(),
            completed_files: self.completed_files.clone(),
            dependencies: self.dependencies.iter().cloned().collect(),
            undeclared_dependencies: self.undeclared_dependencies.clone(),
            sandbox_id: self.sandbox_id.clone(),
            attempts: self.attempt_history.len(),
            stop_reason: self.stop_reason.clone(),
            answer: self.answer.clone(),
            output_dir: self.session.root().to_path_buf(),
            token_usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub route: Route,
    pub status: EvalStatus,
    pub iteration_count: u32,
    pub error_category: ErrorCategory,
    pub error_report: Option<String>,
    pub completed_files: Vec<String>,
    /// Architect 规划的依赖（归一化）
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub undeclared_dependencies: Vec<String>,
    pub sandbox_id: Option<String>,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub output_dir: PathBuf,
    /// 由 Orchestrator 在运行结束时从 LLM 客户端填入
    pub token_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_completed_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), "s").unwrap();
        let mut state = PipelineState::new(session, "build a thing", SearchMethod::Semantic);
        state.mark_completed("app.py");
        state.mark_completed("requirements.txt");
        state.mark_completed("app.py");
        assert_eq!(state.completed_files, vec!["app.py", "requirements.txt"]);

        let report = serde_json::to_value(state.report()).unwrap();
        assert_eq!(report["status"], "pending");
        assert_eq!(report["session_id"], "s");
        assert!(report.get("answer").is_none());
    }
}
