//! 依赖校验：在沙箱之前确认清单中声明的包真实存在
//!
//! 扫描整棵代码树（任意嵌套）中的 requirements.txt / package.json / pyproject.toml。
//! 不存在的包或无法解析的清单都算失败项；任意失败即合成一个环境失败的 ExecutionResult，
//! 直接交给 Evaluator，跳过沙箱。网络错误只算「无法判定」，不计失败。
//! 输出按（清单路径，包名）排序，清单与仓库状态不变时结果完全相同。
//! Architect 规划的依赖若没有出现在任何清单中，只记录告警并写入运行报告，不算失败。

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::pipeline::registries::{Existence, PackageRegistry};
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::ExecutionResult;
use crate::pipeline::workspace::list_code_files;
use crate::pipeline::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ecosystem {
    PyPi,
    Npm,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeclaredPackage {
    pub manifest: String,
    pub name: String,
    pub ecosystem: Ecosystem,
}

#[derive(Debug, Default)]
pub struct ManifestScan {
    pub packages: Vec<DeclaredPackage>,
    /// 无法解析的清单
    pub malformed: Vec<String>,
}

static REQUIREMENT_NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 解析一条 PEP 508 需求（requirements.txt 行或 pyproject 依赖项），返回归一化包名
pub fn parse_requirement(line: &str) -> Option<String> {
    let line = line.split(" #").next().unwrap_or("").trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    if line.contains("://") || line.starts_with("git+") || line.starts_with('.') || line.starts_with('/') {
        return None;
    }
    REQUIREMENT_NAME_RE
        .get_or_init(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)").ok())
        .as_ref()?
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

pub fn parse_requirements_txt(content: &str) -> Vec<String> {
    content.lines().filter_map(parse_requirement).collect()
}

/// 跳过非仓库来源（本地路径、git、workspace、URL、GitHub 简写）
fn is_registry_spec(spec: &str) -> bool {
    let spec = spec.trim();
    !(spec.contains(':') || spec.contains('/'))
}

pub fn parse_package_json(content: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let mut names = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        let Some(map) = value.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, spec) in map {
            let spec = spec.as_str().unwrap_or("");
            if is_registry_spec(spec) {
                names.push(name.trim().to_lowercase());
            }
        }
    }
    Ok(names)
}

pub fn parse_pyproject(content: &str) -> Result<Vec<String>, String> {
    let value: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
    Ok(value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
        .map(|deps| deps.iter().filter_map(|d| d.as_str()).filter_map(parse_requirement).collect())
        .unwrap_or_default())
}

/// 扫描代码树中的所有清单
pub async fn scan_manifests(code_dir: &Path) -> ManifestScan {
    let mut scan = ManifestScan::default();
    for file in list_code_files(code_dir) {
        let name = file.relative.rsplit('/').next().unwrap_or("");
        let (ecosystem, parsed) = match name {
            "requirements.txt" | "package.json" | "pyproject.toml" => {
                let content = match tokio::fs::read_to_string(&file.path).await {
                    Ok(c) => c,
                    Err(e) => {
                        scan.malformed.push(format!("{}: unreadable ({})", file.relative, e));
                        continue;
                    }
                };
                match name {
                    "requirements.txt" => (Ecosystem::PyPi, Ok(parse_requirements_txt(&content))),
                    "package.json" => (Ecosystem::Npm, parse_package_json(&content)),
                    _ => (Ecosystem::PyPi, parse_pyproject(&content)),
                }
            }
            _ => continue,
        };
        match parsed {
            Ok(names) => scan.packages.extend(names.into_iter().map(|name| DeclaredPackage {
                manifest: file.relative.clone(),
                name,
                ecosystem,
            })),
            Err(e) => scan.malformed.push(format!("{}: malformed manifest ({})", file.relative, e)),
        }
    }
    scan.packages.sort();
    scan.packages.dedup();
    scan
}

/// 规划了但没有任何清单声明的依赖（按名字排序）
pub fn undeclared(planned: &BTreeSet<String>, scan: &ManifestScan) -> Vec<String> {
    let canonical = |name: &str| name.trim().to_lowercase().replace('_', "-");
    let declared: BTreeSet<String> = scan.packages.iter().map(|p| canonical(&p.name)).collect();
    planned
        .iter()
        .filter(|name| !declared.contains(&canonical(name)))
        .cloned()
        .collect()
}

/// 校验清单；全部通过返回 None，否则返回合成的失败结果
pub async fn validate(
    code_dir: &Path,
    pypi: &dyn PackageRegistry,
    npm: &dyn PackageRegistry,
) -> Option<ExecutionResult> {
    check_scan(scan_manifests(code_dir).await, pypi, npm).await
}

async fn check_scan(scan: ManifestScan, pypi: &dyn PackageRegistry, npm: &dyn PackageRegistry) -> Option<ExecutionResult> {
    let mut failures = scan.malformed;
    let mut checked: BTreeSet<(Ecosystem, String)> = BTreeSet::new();

    for pkg in &scan.packages {
        if !checked.insert((pkg.ecosystem, pkg.name.clone())) {
            continue;
        }
        let registry = match pkg.ecosystem {
            Ecosystem::PyPi => pypi,
            Ecosystem::Npm => npm,
        };
        match registry.exists(&pkg.name).await {
            Existence::Exists => {}
            Existence::Missing => failures.push(format!(
                "{}: package '{}' does not exist on {}",
                pkg.manifest,
                pkg.name,
                registry.name()
            )),
            Existence::Inconclusive => {
                tracing::warn!(package = %pkg.name, "existence check inconclusive, skipping");
            }
        }
    }

    if failures.is_empty() {
        tracing::info!(packages = checked.len(), "dependencies verified");
        return None;
    }
    let logs = format!(
        "Dependency validation failed before installation.\n{}",
        failures.iter().map(|f| format!("- {}", f)).collect::<Vec<_>>().join("\n")
    );
    Some(ExecutionResult::environment_failure(logs))
}

/// 节点入口：失败结果计为一次执行尝试
pub async fn run(state: &mut PipelineState, services: &Services) {
    let scan = scan_manifests(&state.session.code_dir()).await;
    state.undeclared_dependencies = undeclared(&state.dependencies, &scan);
    if !state.undeclared_dependencies.is_empty() {
        tracing::warn!(
            packages = ?state.undeclared_dependencies,
            "planned dependencies missing from every manifest"
        );
    }

    let result = check_scan(scan, services.pypi.as_ref(), services.npm.as_ref()).await;
    if let Some(failed) = &result {
        tracing::warn!(logs = %failed.logs, "dependency validation failed");
        state.iteration_count += 1;
    }
    state.execution_result = result;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::registries::StaticRegistry;

    #[test]
    fn test_parse_requirements() {
        let names = parse_requirements_txt(
            "# web\nFlask==3.0.0\nrequests[socks]>=2.0 ; python_version>'3.8'\n-r other.txt\n\
             git+https://github.com/x/y.git\nuvicorn # server\n\n./local_pkg\n",
        );
        assert_eq!(names, vec!["flask", "requests", "uvicorn"]);
    }

    #[test]
    fn test_parse_package_json() {
        let names = parse_package_json(
            r#"{"dependencies":{"react":"^18.2.0","local":"file:../x","gh":"user/repo"},
                "devDependencies":{"vitest":"1.0.0","ws":"workspace:*"}}"#,
        )
        .unwrap();
        assert_eq!(names, vec!["react", "vitest"]);
        assert!(parse_package_json("{ not json").is_err());
    }

    #[test]
    fn test_parse_pyproject() {
        let names = parse_pyproject(
            "[project]\nname = \"demo\"\ndependencies = [\"FastAPI>=0.100\", \"pydantic\"]\n",
        )
        .unwrap();
        assert_eq!(names, vec!["fastapi", "pydantic"]);
    }

    async fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_planned_but_undeclared_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "Flask==3.0\npython_dotenv\n").unwrap();
        let scan = scan_manifests(dir.path()).await;
        let planned: BTreeSet<String> = ["flask", "python-dotenv", "sqlalchemy"].iter().map(|s| s.to_string()).collect();
        assert_eq!(undeclared(&planned, &scan), vec!["sqlalchemy"]);
        assert!(undeclared(&BTreeSet::new(), &scan).is_empty());
    }

    #[tokio::test]
    async fn test_missing_package_synthesizes_failure() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "backend/requirements.txt", "flask\nflasck-fake\n").await;
        let pypi = StaticRegistry::new("PyPI", ["flask"]);
        let npm = StaticRegistry::new("npm", Vec::<String>::new());

        let result = validate(dir.path(), &pypi, &npm).await.unwrap();
        assert!(!result.environment_ok);
        assert!(!result.tests_ran);
        assert_eq!(result.exit_code, 1);
        assert!(result.logs.contains("flasck-fake"));
        assert!(!result.logs.contains("'flask'"));
    }

    #[tokio::test]
    async fn test_malformed_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "frontend/package.json", "{ broken").await;
        let pypi = StaticRegistry::new("PyPI", Vec::<String>::new());
        let npm = StaticRegistry::new("npm", Vec::<String>::new());
        let result = validate(dir.path(), &pypi, &npm).await.unwrap();
        assert!(result.logs.contains("frontend/package.json"));
    }

    #[tokio::test]
    async fn test_inconclusive_is_not_failure() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "flask\nmystery\n").await;
        let pypi = StaticRegistry::new("PyPI", ["flask"]).with_unreachable("mystery");
        let npm = StaticRegistry::new("npm", Vec::<String>::new());
        assert!(validate(dir.path(), &pypi, &npm).await.is_none());
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "zzz-missing\naaa-missing\n").await;
        write(dir.path(), "web/package.json", r#"{"dependencies":{"left-padd":"1.0.0"}}"#).await;
        let pypi = StaticRegistry::new("PyPI", Vec::<String>::new());
        let npm = StaticRegistry::new("npm", Vec::<String>::new());
        let first = validate(dir.path(), &pypi, &npm).await;
        let second = validate(dir.path(), &pypi, &npm).await;
        assert_eq!(first, second);
        let logs = first.unwrap().logs;
        assert!(logs.find("aaa-missing").unwrap() < logs.find("zzz-missing").unwrap());
    }
}
