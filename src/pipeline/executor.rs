//! Executor：在沙箱中安装依赖并运行测试
//!
//! 1. 先尝试重连注册表中的沙箱，失败再按模板新建并登记
//! 2. 每次都把整棵代码树全量同步进沙箱
//! 3. 安装失败 ⇒ 环境失败结果，跳过测试
//! 4. 混合模板先跑前端、后跑后端；前端失败则后端不再执行
//!
//! 安装与测试失败、超时都变成 ExecutionResult，从不作为错误抛给编排器。
//! 每次调用都会使 iteration_count 加一。

use std::time::Duration;

use crate::pipeline::state::PipelineState;
use crate::pipeline::types::ExecutionResult;
use crate::pipeline::workspace::{list_code_files, CodeFile};
use crate::pipeline::Services;
use crate::sandbox::{select_runtime, RuntimeTemplate, Sandbox, SandboxError, SandboxProvider, SandboxRegistry};

/// 超时退出码（与 coreutils `timeout` 一致）
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// pytest：未收集到任何测试
pub const PYTEST_NO_TESTS: i32 = 5;
/// 没有可运行测试时写入日志的标记
pub const NO_TESTS_MARKER: &str = "NO TESTS COLLECTED";

pub const FRONTEND_HEADER: &str = "=== FRONTEND LOGS ===";
pub const BACKEND_HEADER: &str = "=== BACKEND LOGS ===";
pub const FRONTEND_CRASH_MARKER: &str = "FRONTEND CRASHED";

/// 清单所在目录（相对 code 根，"." 表示根目录）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectLayout {
    pub python_dir: Option<String>,
    pub python_manifest: Option<String>,
    pub node_dir: Option<String>,
}

fn parent_dir(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

fn shallowest<'a>(files: &'a [CodeFile], name: &str) -> Option<&'a CodeFile> {
    files
        .iter()
        .filter(|f| f.relative == name || f.relative.ends_with(&format!("/{}", name)))
        .min_by(|a, b| {
            let depth = |f: &CodeFile| f.relative.matches('/').count();
            depth(a).cmp(&depth(b)).then_with(|| a.relative.cmp(&b.relative))
        })
}

impl ProjectLayout {
    pub fn detect(files: &[CodeFile]) -> Self {
        let python = shallowest(files, "requirements.txt").or_else(|| shallowest(files, "pyproject.toml"));
        let python_dir = python
            .map(|f| parent_dir(&f.relative))
            .or_else(|| files.iter().any(|f| f.relative.ends_with(".py")).then(|| ".".to_string()));
        Self {
            python_dir,
            python_manifest: python.map(|f| f.relative.rsplit('/').next().unwrap_or("").to_string()),
            node_dir: shallowest(files, "package.json").map(|f| parent_dir(&f.relative)),
        }
    }
}

/// 单引号转义，供 `sh -c` 使用
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn in_dir(dir: &str, cmd: &str) -> String {
    format!("cd {} && {}", sh_quote(dir), cmd)
}

fn python_install(layout: &ProjectLayout) -> Option<String> {
    let dir = layout.python_dir.as_deref()?;
    match layout.python_manifest.as_deref()? {
        "requirements.txt" => Some(in_dir(dir, "pip install -q -r requirements.txt")),
        _ => Some(in_dir(dir, "pip install -q .")),
    }
}

fn python_test(layout: &ProjectLayout) -> String {
    in_dir(layout.python_dir.as_deref().unwrap_or("."), "python -m pytest -q")
}

fn node_install(layout: &ProjectLayout) -> Option<String> {
    layout
        .node_dir
        .as_deref()
        .map(|dir| in_dir(dir, "npm install --no-audit --no-fund"))
}

fn node_test(layout: &ProjectLayout) -> String {
    in_dir(layout.node_dir.as_deref().unwrap_or("."), "CI=true npm test --silent")
}

/// 某个模板下的安装命令（按执行顺序）
pub fn install_commands(template: RuntimeTemplate, layout: &ProjectLayout) -> Vec<String> {
    let mut cmds = Vec::new();
    if template.needs_node() {
        cmds.extend(node_install(layout));
    }
    if template.needs_python() {
        cmds.extend(python_install(layout));
    }
    cmds
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestRunner {
    Python,
    Node,
}

fn describe_error(e: &SandboxError) -> (i32, String) {
    match e {
        SandboxError::Timeout(secs) => (TIMEOUT_EXIT_CODE, format!("Command timed out after {}s", secs)),
        other => (1, other.to_string()),
    }
}

async fn run_tests(
    sandbox: &dyn Sandbox,
    runner: TestRunner,
    layout: &ProjectLayout,
    timeout: Duration,
) -> (bool, bool, i32, String) {
    let cmd = match runner {
        TestRunner::Python => python_test(layout),
        TestRunner::Node => node_test(layout),
    };
    match sandbox.run(&cmd, timeout, false).await {
        // 没跑任何测试不算通过
        Ok(out) if runner == TestRunner::Python && out.exit_code == PYTEST_NO_TESTS => (
            false,
            false,
            PYTEST_NO_TESTS,
            format!("{}\n{}: pytest found no tests to run", out.combined(), NO_TESTS_MARKER),
        ),
        Ok(out) => (true, out.success(), out.exit_code, out.combined()),
        Err(e) => {
            let (code, msg) = describe_error(&e);
            (true, false, code, msg)
        }
    }
}

/// 在已同步的沙箱中执行安装与测试
pub async fn execute_in_sandbox(
    sandbox: &dyn Sandbox,
    template: RuntimeTemplate,
    layout: &ProjectLayout,
    install_timeout: Duration,
    test_timeout: Duration,
) -> ExecutionResult {
    let mut install_log = Vec::new();
    for cmd in install_commands(template, layout) {
        match sandbox.run(&cmd, install_timeout, false).await {
            Ok(out) if out.success() => install_log.push(out.combined()),
            Ok(out) => {
                return ExecutionResult::environment_failure(format!(
                    "Dependency installation failed (exit {}): {}\n{}",
                    out.exit_code,
                    cmd,
                    out.combined()
                ))
            }
            Err(e) => {
                let (_, msg) = describe_error(&e);
                return ExecutionResult::environment_failure(format!(
                    "Dependency installation failed: {}\n{}",
                    cmd, msg
                ));
            }
        }
    }

    match template {
        RuntimeTemplate::PythonOnly | RuntimeTemplate::NodeOnly => {
            let runner = if template == RuntimeTemplate::PythonOnly {
                TestRunner::Python
            } else {
                TestRunner::Node
            };
            let (ran, passed, code, logs) = run_tests(sandbox, runner, layout, test_timeout).await;
            ExecutionResult {
                tests_ran: ran,
                tests_passed: passed,
                exit_code: code,
                logs,
                environment_ok: true,
            }
        }
        RuntimeTemplate::Hybrid => {
            let (f_ran, f_passed, f_code, f_logs) = run_tests(sandbox, TestRunner::Node, layout, test_timeout).await;
            if !f_passed {
                tracing::warn!(exit_code = f_code, "frontend tests failed, skipping backend");
                return ExecutionResult {
                    tests_ran: f_ran,
                    tests_passed: false,
                    exit_code: f_code,
                    logs: format!(
                        "{}\n{}\n\n{} (exit {}): backend tests skipped",
                        FRONTEND_HEADER, f_logs, FRONTEND_CRASH_MARKER, f_code
                    ),
                    environment_ok: true,
                };
            }
            let (b_ran, b_passed, b_code, b_logs) = run_tests(sandbox, TestRunner::Python, layout, test_timeout).await;
            ExecutionResult {
                tests_ran: f_ran || b_ran,
                tests_passed: b_passed,
                exit_code: b_code,
                logs: format!("{}\n{}\n\n{}\n{}", FRONTEND_HEADER, f_logs, BACKEND_HEADER, b_logs),
                environment_ok: true,
            }
        }
    }
}

/// 重连优先，失败再新建并登记；返回沙箱句柄
pub async fn acquire_sandbox(
    provider: &dyn SandboxProvider,
    registry: &SandboxRegistry,
    session_id: &str,
    known_id: Option<&str>,
    template: RuntimeTemplate,
) -> Result<Box<dyn Sandbox>, SandboxError> {
    let candidate = match known_id {
        Some(id) => Some(id.to_string()),
        None => registry.get(session_id).await,
    };
    if let Some(id) = candidate {
        match provider.connect(&id).await {
            Ok(sandbox) => return Ok(sandbox),
            Err(e) => tracing::warn!(sandbox = %id, error = %e, "reconnect failed, creating a new sandbox"),
        }
    }
    let sandbox = provider.create(template).await?;
    if let Err(e) = registry.register(session_id, sandbox.id()).await {
        tracing::warn!(error = %e, "failed to persist sandbox binding");
    }
    Ok(sandbox)
}

async fn sync_code(sandbox: &dyn Sandbox, files: &[CodeFile]) -> Result<usize, SandboxError> {
    for file in files {
        let bytes = tokio::fs::read(&file.path).await?;
        sandbox.write(&file.relative, &bytes).await?;
    }
    Ok(files.len())
}

pub async fn run(state: &mut PipelineState, services: &Services) {
    let files = list_code_files(&state.session.code_dir());
    let completed = if state.completed_files.is_empty() {
        files.iter().map(|f| f.relative.clone()).collect()
    } else {
        state.completed_files.clone()
    };
    let template = select_runtime(&completed);
    let layout = ProjectLayout::detect(&files);
    tracing::info!(template = template.template_id(), files = files.len(), "executing");

    let result = match acquire_sandbox(
        services.sandbox.as_ref(),
        &services.sandbox_registry,
        state.session.id(),
        state.sandbox_id.as_deref(),
        template,
    )
    .await
    {
        Ok(sandbox) => {
            state.sandbox_id = Some(sandbox.id().to_string());
            match sync_code(sandbox.as_ref(), &files).await {
                Ok(count) => {
                    tracing::debug!(files = count, "code synced");
                    let cfg = &services.config.sandbox;
                    execute_in_sandbox(
                        sandbox.as_ref(),
                        template,
                        &layout,
                        Duration::from_secs(cfg.install_timeout_secs),
                        Duration::from_secs(cfg.test_timeout_secs),
                    )
                    .await
                }
                Err(e) => ExecutionResult::environment_failure(format!("Failed to sync code into sandbox: {}", e)),
            }
        }
        Err(e) => ExecutionResult::environment_failure(format!("Sandbox unavailable: {}", e)),
    };

    state.iteration_count += 1;
    tracing::info!(
        passed = result.tests_passed,
        exit_code = result.exit_code,
        environment_ok = result.environment_ok,
        iteration = state.iteration_count,
        "execution finished"
    );
    state.execution_result = Some(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 按命令子串返回预设结果，并记录执行过的命令
    struct ScriptedSandbox {
        rules: Vec<(&'static str, i32)>,
        ran: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        fn id(&self) -> &str {
            "sbx-test"
        }

        async fn write(&self, _: &str, _: &[u8]) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn run(&self, cmd: &str, _: Duration, _: bool) -> Result<CommandOutput, SandboxError> {
            self.ran.lock().unwrap().push(cmd.to_string());
            let code = self
                .rules
                .iter()
                .find(|(needle, _)| cmd.contains(needle))
                .map(|(_, c)| *c)
                .unwrap_or(0);
            if code == TIMEOUT_EXIT_CODE {
                return Err(SandboxError::Timeout(60));
            }
            Ok(CommandOutput {
                stdout: format!("ran: {}", cmd),
                stderr: String::new(),
                exit_code: code,
            })
        }
    }

    fn hybrid_layout() -> ProjectLayout {
        ProjectLayout {
            python_dir: Some("backend".into()),
            python_manifest: Some("requirements.txt".into()),
            node_dir: Some("frontend".into()),
        }
    }

    const SECS: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_hybrid_frontend_failure_skips_backend() {
        let sandbox = ScriptedSandbox {
            rules: vec![("npm test", 1)],
            ran: Mutex::new(Vec::new()),
        };
        let result = execute_in_sandbox(&sandbox, RuntimeTemplate::Hybrid, &hybrid_layout(), SECS, SECS).await;
        assert!(!result.tests_passed);
        assert!(result.environment_ok);
        assert!(result.logs.contains("FRONTEND LOGS"));
        assert!(result.logs.contains(FRONTEND_CRASH_MARKER));
        assert!(!result.logs.contains("BACKEND LOGS"));
        assert!(!sandbox.ran.lock().unwrap().iter().any(|c| c.contains("pytest")));
    }

    #[tokio::test]
    async fn test_hybrid_success_has_both_sections() {
        let sandbox = ScriptedSandbox {
            rules: vec![],
            ran: Mutex::new(Vec::new()),
        };
        let result = execute_in_sandbox(&sandbox, RuntimeTemplate::Hybrid, &hybrid_layout(), SECS, SECS).await;
        assert!(result.tests_passed);
        let logs = &result.logs;
        assert!(logs.find(FRONTEND_HEADER).unwrap() < logs.find(BACKEND_HEADER).unwrap());
        let ran = sandbox.ran.lock().unwrap();
        assert!(ran[0].contains("npm install"));
        assert!(ran.last().unwrap().contains("pytest"));
    }

    #[tokio::test]
    async fn test_install_failure_skips_tests() {
        let sandbox = ScriptedSandbox {
            rules: vec![("pip install", 1)],
            ran: Mutex::new(Vec::new()),
        };
        let layout = ProjectLayout {
            python_dir: Some(".".into()),
            python_manifest: Some("requirements.txt".into()),
            node_dir: None,
        };
        let result = execute_in_sandbox(&sandbox, RuntimeTemplate::PythonOnly, &layout, SECS, SECS).await;
        assert!(!result.environment_ok);
        assert_eq!(result.exit_code, 1);
        assert!(!result.tests_ran);
        assert_eq!(sandbox.ran.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_test_timeout_is_a_result() {
        let sandbox = ScriptedSandbox {
            rules: vec![("pytest", TIMEOUT_EXIT_CODE)],
            ran: Mutex::new(Vec::new()),
        };
        let result =
            execute_in_sandbox(&sandbox, RuntimeTemplate::PythonOnly, &ProjectLayout::default(), SECS, SECS).await;
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.environment_ok);
        assert!(result.logs.contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_tests_collected_is_not_a_pass() {
        let sandbox = ScriptedSandbox {
            rules: vec![("pytest", PYTEST_NO_TESTS)],
            ran: Mutex::new(Vec::new()),
        };
        let result =
            execute_in_sandbox(&sandbox, RuntimeTemplate::PythonOnly, &ProjectLayout::default(), SECS, SECS).await;
        assert!(!result.tests_ran);
        assert!(!result.tests_passed);
        assert!(result.environment_ok);
        assert_eq!(result.exit_code, PYTEST_NO_TESTS);
        assert!(result.logs.contains(NO_TESTS_MARKER));
    }

    #[test]
    fn test_layout_detection() {
        let file = |rel: &str| CodeFile {
            relative: rel.into(),
            path: rel.into(),
            modified: std::time::SystemTime::UNIX_EPOCH,
        };
        let files = vec![
            file("backend/app.py"),
            file("backend/requirements.txt"),
            file("frontend/package.json"),
            file("frontend/src/App.jsx"),
        ];
        let layout = ProjectLayout::detect(&files);
        assert_eq!(layout.python_dir.as_deref(), Some("backend"));
        assert_eq!(layout.node_dir.as_deref(), Some("frontend"));
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }
}
