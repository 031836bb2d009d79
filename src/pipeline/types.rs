//! 流水线数据类型
//!
//! LLM 结构化输出（Plan / ArchitectBuild / ArchitectQa / RepairPlan / EvaluationVerdict）
//! 都派生 JsonSchema，schema 直接注入 prompt。FileTask 与 DebugTask 是两种独立结构，
//! 通过 Task 标签联合进入同一个队列。

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::sanitize_relative;

/// Router 的分流结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    #[default]
    Build,
    Debug,
    Learn,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryRoute {
    /// build: new features or code; debug: fixing errors; learn: general questions
    pub route: Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TechStack {
    Python,
    Node,
    Fullstack,
}

/// 高层开发计划（生成一次，之后只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub project_goal: String,
    pub tech_stack: TechStack,
    pub steps: Vec<String>,
}

/// Coder 的工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileTask {
    /// Path relative to the project root, e.g. `backend/app.py`
    pub file_name: String,
    pub task_description: String,
    #[serde(default)]
    pub related_docs_topic: String,
}

/// Debugger 产生的修复任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DebugTask {
    pub file_name: String,
    pub bug_analysis: String,
    pub task_description: String,
    #[serde(default)]
    pub related_docs_topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    File(FileTask),
    Debug(DebugTask),
}

impl Task {
    pub fn file_name(&self) -> &str {
        match self {
            Self::File(t) => &t.file_name,
            Self::Debug(t) => &t.file_name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::File(t) => &t.task_description,
            Self::Debug(t) => &t.task_description,
        }
    }

    pub fn docs_topic(&self) -> &str {
        match self {
            Self::File(t) => &t.related_docs_topic,
            Self::Debug(t) => &t.related_docs_topic,
        }
    }

    pub fn bug_analysis(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::Debug(t) => Some(&t.bug_analysis),
        }
    }

    /// 文件名必须是不逃逸项目根目录的相对路径，描述不能为空
    pub fn is_valid(&self) -> bool {
        !self.description().trim().is_empty() && sanitize_relative(self.file_name()).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QaTask {
    pub test_file_name: String,
    pub target_file: String,
    pub test_scenarios: Vec<String>,
}

/// Architect 第一次调用：文件任务 + 依赖
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectBuild {
    pub tasks: Vec<FileTask>,
    /// Third-party package names the project needs
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Architect 第二次调用：测试计划
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectQa {
    #[serde(default)]
    pub qa_tasks: Vec<QaTask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RepairPlan {
    pub tasks: Vec<DebugTask>,
}

/// 依赖名归一化：去空白、转小写、丢弃空项
pub fn normalize_dependencies<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect()
}

/// 一次安装 + 测试的结果；由依赖校验（合成）或 Executor（真实执行）产生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tests_ran: bool,
    pub tests_passed: bool,
    pub exit_code: i32,
    pub logs: String,
    pub environment_ok: bool,
}

impl ExecutionResult {
    /// 环境层面的失败（依赖不存在、安装失败、沙箱不可用），测试未运行
    pub fn environment_failure(logs: impl Into<String>) -> Self {
        Self {
            tests_ran: false,
            tests_passed: false,
            exit_code: 1,
            logs: logs.into(),
            environment_ok: false,
        }
    }

    pub fn tests(passed: bool, exit_code: i32, logs: impl Into<String>) -> Self {
        Self {
            tests_ran: true,
            tests_passed: passed,
            exit_code,
            logs: logs.into(),
            environment_ok: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    #[default]
    None,
    Infra,
    Syntax,
    Runtime,
    Logical,
    Timeout,
}

impl ErrorCategory {
    /// Debugger 的分类指导
    pub fn focus(self) -> &'static str {
        match self {
            Self::Infra => "Touch only dependency manifest files (requirements.txt, package.json, pyproject.toml). Remove or correct packages that do not exist or fail to install.",
            Self::Timeout => "Find unbounded loops, blocking calls or servers started in the foreground. Add exit conditions and timeouts.",
            Self::Logical => "Fix the algorithm or the expected values behind failing assertions. The code runs; do not rewrite syntax.",
            Self::Syntax => "Fix the exact malformed lines and missing imports reported in the log.",
            Self::Runtime => "Trace the variable, type or attribute mismatch that causes the crash and fix it at the source.",
            Self::None => "Diagnose the reported problem and apply the smallest change that fixes it.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    #[default]
    Pending,
    Pass,
    Fail,
}

/// Evaluator 的 LLM 分类结果
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EvaluationVerdict {
    pub category: ErrorCategory,
    /// One or two sentences describing the root cause
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub error: String,
    pub plan_summary: String,
    pub recorded_at: String,
}

/// 只追加的修复尝试历史
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptHistory {
    records: Vec<AttemptRecord>,
}

impl AttemptHistory {
    pub fn push(&mut self, error: impl Into<String>, plan_summary: impl Into<String>) {
        self.records.push(AttemptRecord {
            error: error.into(),
            plan_summary: plan_summary.into(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_tagged_serialization() {
        let task = Task::File(FileTask {
            file_name: "app.py".into(),
            task_description: "Flask app".into(),
            related_docs_topic: String::new(),
        });
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["file_name"], "app.py");
    }

    #[test]
    fn test_task_validation() {
        let mut task = FileTask {
            file_name: "../escape.py".into(),
            task_description: "x".into(),
            related_docs_topic: String::new(),
        };
        assert!(!Task::File(task.clone()).is_valid());
        task.file_name = "src/ok.py".into();
        assert!(Task::File(task.clone()).is_valid());
        task.task_description = "  ".into();
        assert!(!Task::File(task).is_valid());
    }

    #[test]
    fn test_normalize_dependencies() {
        let deps = normalize_dependencies([" Flask ", "flask", "", "Requests"]);
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["flask", "requests"]);
    }

    #[test]
    fn test_attempt_history_appends() {
        let mut history = AttemptHistory::default();
        history.push("boom", "app.py: fix import");
        history.push("boom again", "app.py: fix import");
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().error, "boom again");
    }

    #[test]
    fn test_plan_deserializes_tech_stack() {
        let plan: Plan = serde_json::from_str(
            r#"{"project_goal":"todo api","tech_stack":"fullstack","steps":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(plan.tech_stack, TechStack::Fullstack);
    }
}
