//! Evaluator：把执行结果判定为通过 / 失败，并归入唯一的错误类别
//!
//! 快速路径：tests_passed ∧ environment_ok ⇒ pass，不看日志。
//! 失败时先做确定性预分类（环境失败 ⇒ infra，超时 ⇒ timeout，一个测试都没跑 ⇒ logical），其余交给 LLM 分类；
//! 分类失败默认 runtime，并附上日志尾部，保证修复循环总有可用输入。

use crate::core::text::tail_chars;
use crate::llm::generate_structured;
use crate::pipeline::executor::TIMEOUT_EXIT_CODE;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{ErrorCategory, EvalStatus, EvaluationVerdict, ExecutionResult};
use crate::pipeline::Services;

const LOG_TAIL_CHARS: usize = 2000;

const TIMEOUT_MARKERS: &[&str] = &["timed out", "TimeoutError", "Timeout exceeded", "deadline exceeded"];

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: EvalStatus,
    pub error_report: Option<String>,
    pub error_category: ErrorCategory,
}

/// 不需要 LLM 就能确定的类别
pub fn pre_classify(result: &ExecutionResult) -> Option<ErrorCategory> {
    if !result.environment_ok {
        return Some(ErrorCategory::Infra);
    }
    if result.exit_code == TIMEOUT_EXIT_CODE || TIMEOUT_MARKERS.iter().any(|m| result.logs.contains(m)) {
        return Some(ErrorCategory::Timeout);
    }
    if !result.tests_ran {
        return Some(ErrorCategory::Logical);
    }
    None
}

fn report(summary: &str, logs: &str) -> String {
    format!("{}\n\nLog tail:\n{}", summary.trim(), tail_chars(logs.trim(), LOG_TAIL_CHARS))
}

pub async fn evaluate(result: &ExecutionResult, services: &Services) -> Evaluation {
    if result.tests_passed && result.environment_ok {
        return Evaluation {
            status: EvalStatus::Pass,
            error_report: None,
            error_category: ErrorCategory::None,
        };
    }

    if let Some(category) = pre_classify(result) {
        let summary = match category {
            ErrorCategory::Infra => "The environment could not be prepared (dependency or sandbox failure).",
            ErrorCategory::Timeout => "Execution exceeded its time limit.",
            _ => "No tests were collected, so the code is untested. Add test files that exercise the code.",
        };
        return Evaluation {
            status: EvalStatus::Fail,
            error_report: Some(report(summary, &result.logs)),
            error_category: category,
        };
    }

    let prompt = format!(
        "Classify this failed test run into exactly one category: syntax (code does not parse or \
         imports fail), runtime (crash or exception while running), logical (runs but assertions \
         fail), timeout, infra. Summarise the root cause in one or two sentences.\n\n\
         Exit code: {}\nTests ran: {}\n\nLogs:\n{}",
        result.exit_code,
        result.tests_ran,
        tail_chars(&result.logs, LOG_TAIL_CHARS * 2)
    );
    let (category, summary) = match generate_structured::<EvaluationVerdict>(services.llm.as_ref(), &prompt).await {
        Ok(verdict) if verdict.category != ErrorCategory::None => (verdict.category, verdict.summary),
        Ok(verdict) => (ErrorCategory::Runtime, verdict.summary),
        Err(e) => {
            tracing::warn!(error = %e, "failure classification failed, defaulting to runtime");
            (ErrorCategory::Runtime, format!("Tests failed with exit code {}.", result.exit_code))
        }
    };
    Evaluation {
        status: EvalStatus::Fail,
        error_report: Some(report(&summary, &result.logs)),
        error_category: category,
    }
}

pub async fn run(state: &mut PipelineState, services: &Services) {
    let evaluation = match &state.execution_result {
        Some(result) => evaluate(result, services).await,
        None => Evaluation {
            status: EvalStatus::Fail,
            error_report: Some("No execution result was produced.".to_string()),
            error_category: ErrorCategory::Infra,
        },
    };
    tracing::info!(
        status = ?evaluation.status,
        category = ?evaluation.error_category,
        iteration = state.iteration_count,
        "evaluated"
    );
    state.status = evaluation.status;
    state.error_category = evaluation.error_category;
    state.error_report = evaluation.error_report;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_classify() {
        assert_eq!(
            pre_classify(&ExecutionResult::environment_failure("flasck-fake")),
            Some(ErrorCategory::Infra)
        );
        assert_eq!(
            pre_classify(&ExecutionResult::tests(false, TIMEOUT_EXIT_CODE, "")),
            Some(ErrorCategory::Timeout)
        );
        assert_eq!(
            pre_classify(&ExecutionResult::tests(false, 1, "AssertionError: 2 != 3")),
            None
        );
    }

    #[test]
    fn test_untested_run_is_logical() {
        let untested = ExecutionResult {
            tests_ran: false,
            tests_passed: false,
            exit_code: 5,
            logs: "no tests ran in 0.01s".to_string(),
            environment_ok: true,
        };
        assert_eq!(pre_classify(&untested), Some(ErrorCategory::Logical));
    }

    #[test]
    fn test_report_keeps_tail() {
        let logs = format!("{}END", "x".repeat(5000));
        let r = report("boom", &logs);
        assert!(r.starts_with("boom"));
        assert!(r.ends_with("END"));
        assert!(r.len() < 2100);
    }
}
