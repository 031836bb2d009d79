//! 本地沙箱：每个沙箱是 `sandbox.root/<id>/` 下的一个目录
//!
//! 命令经 `sh -c` 在沙箱目录内执行，带超时。前台命令独占一个进程组，超时时整组 SIGKILL，
//! `cd … && pytest` 这类命令派生的孙进程不会残留。
//! 远程虚机服务只需实现同样的 SandboxProvider / Sandbox 即可替换。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::sanitize_relative;
use crate::sandbox::{CommandOutput, RuntimeTemplate, Sandbox, SandboxError, SandboxProvider};

/// 记录创建时所用模板的标记文件
const TEMPLATE_MARKER: &str = ".sandbox_template";

pub struct LocalSandboxProvider {
    root: PathBuf,
}

impl LocalSandboxProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        let rel = sanitize_relative(id).map_err(|e| SandboxError::Connect(id.to_string(), e.to_string()))?;
        let dir = self.root.join(rel);
        if !dir.join(TEMPLATE_MARKER).is_file() {
            return Err(SandboxError::Connect(id.to_string(), "no such sandbox".to_string()));
        }
        tracing::info!(sandbox = %id, "reconnected to sandbox");
        Ok(Box::new(LocalSandbox {
            id: id.to_string(),
            dir,
        }))
    }

    async fn create(&self, template: RuntimeTemplate) -> Result<Box<dyn Sandbox>, SandboxError> {
        let id = format!("sbx-{}", uuid::Uuid::new_v4().simple());
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SandboxError::Create(e.to_string()))?;
        tokio::fs::write(dir.join(TEMPLATE_MARKER), template.template_id())
            .await
            .map_err(|e| SandboxError::Create(e.to_string()))?;
        tracing::info!(sandbox = %id, template = template.template_id(), "sandbox created");
        Ok(Box::new(LocalSandbox { id, dir }))
    }
}

pub struct LocalSandbox {
    id: String,
    dir: PathBuf,
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), SandboxError> {
        let rel = sanitize_relative(path).map_err(|e| SandboxError::Command(e.to_string()))?;
        let target = self.dir.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn run(&self, cmd: &str, timeout: Duration, background: bool) -> Result<CommandOutput, SandboxError> {
        tracing::debug!(sandbox = %self.id, command = %cmd, background, "sandbox run");
        let mut command = Command::new("sh");
        command.args(["-c", cmd]).current_dir(&self.dir);

        if background {
            command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            command.spawn().map_err(|e| SandboxError::Command(e.to_string()))?;
            return Ok(CommandOutput::default());
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| SandboxError::Command(e.to_string()))?;
        let pgid = child.id();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| SandboxError::Command(e.to_string()))?,
            Err(_) => {
                kill_process_group(pgid);
                tracing::warn!(sandbox = %self.id, command = %cmd, "command timed out, process group killed");
                return Err(SandboxError::Timeout(timeout.as_secs()));
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// 进程组 id 与组长 pid 相同（process_group(0)）
#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg 只向进程组发送信号，不触及本进程内存
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_connect() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(dir.path());
        let sandbox = provider.create(RuntimeTemplate::PythonOnly).await.unwrap();
        let id = sandbox.id().to_string();

        let again = provider.connect(&id).await.unwrap();
        assert_eq!(again.id(), id);
        assert!(provider.connect("sbx-missing").await.is_err());
    }

    #[tokio::test]
    async fn test_write_and_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(dir.path());
        let sandbox = provider.create(RuntimeTemplate::PythonOnly).await.unwrap();
        sandbox.write("pkg/hello.txt", b"hi there").await.unwrap();

        let out = sandbox
            .run("cat pkg/hello.txt; exit 3", Duration::from_secs(10), false)
            .await
            .unwrap();
        assert_eq!(out.stdout, "hi there");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(dir.path());
        let sandbox = provider.create(RuntimeTemplate::NodeOnly).await.unwrap();
        let err = sandbox.run("sleep 5", Duration::from_millis(200), false).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
    }

    /// 进程不存在或已是僵尸
    #[cfg(target_os = "linux")]
    fn is_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(dir.path());
        let sandbox = provider.create(RuntimeTemplate::PythonOnly).await.unwrap();

        let err = sandbox
            .run(
                "cd '.' && sh -c 'echo $$ > inner.pid; sleep 47 & echo $! > sleep.pid; wait'",
                Duration::from_millis(500),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let sbx_dir = dir.path().join(sandbox.id());
        for name in ["inner.pid", "sleep.pid"] {
            let pid = std::fs::read_to_string(sbx_dir.join(name)).unwrap();
            assert!(is_gone(&pid), "{} ({}) still running", name, pid.trim());
        }
    }
}
