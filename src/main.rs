//! Forge 命令行入口
//!
//! 用法：`forge [--search 0|1] [--session <id>] [--config <path>] <request...>`
//! 省略 request 时从 stdin 读取；Ctrl+C 取消运行；结束时把 RunReport 以 JSON 打印到 stdout。

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::io::AsyncReadExt;

use forge::config::load_config;
use forge::core::{Session, SessionSupervisor};
use forge::research::SearchMethod;
use forge::{observability, Orchestrator, PipelineState, Services};

#[derive(Debug, Default)]
struct CliArgs {
    search: SearchMethod,
    session: Option<String>,
    config: Option<PathBuf>,
    request: Vec<String>,
}

const USAGE: &str = "usage: forge [--search 0|1] [--session <id>] [--config <path>] <request...>";

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--search" | "-s" => {
                let flag = it.next().context("--search needs a value (0 or 1)")?;
                out.search = SearchMethod::from_flag(&flag)
                    .with_context(|| format!("invalid --search value '{}', expected 0 or 1", flag))?;
            }
            "--session" => out.session = Some(it.next().context("--session needs an id")?),
            "--config" | "-c" => out.config = Some(PathBuf::from(it.next().context("--config needs a path")?)),
            "--help" | "-h" => bail!(USAGE),
            _ => out.request.push(arg),
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    let request = if args.request.is_empty() {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading request from stdin")?;
        buf
    } else {
        args.request.join(" ")
    };
    if request.trim().is_empty() {
        bail!("empty request\n{}", USAGE);
    }

    let cfg = load_config(args.config).context("Failed to load config")?;
    let output_root = cfg.app.output_root.clone();
    let services = Services::from_config(cfg).context("Failed to initialise services")?;

    let session = match args.session {
        Some(id) => Session::open(&output_root, id),
        None => Session::create(&output_root),
    }
    .context("Failed to open session directory")?;
    tracing::info!(session = %session.id(), search = ?args.search, "run started");

    let supervisor = SessionSupervisor::new();
    supervisor.cancel_on_ctrl_c();

    let mut state = PipelineState::new(session, request.trim(), args.search);
    let report = Orchestrator::new(&services, supervisor.cancel_token())
        .run(&mut state)
        .await
        .context("Pipeline aborted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
