//! 会话代码树的扫描与目标路径解析
//!
//! 目标文件先按规范路径查找；不存在时按文件名后缀在整棵树中搜索（容忍生成出的嵌套目录）。
//! 后缀匹配是启发式的，可能误中同名文件，每次命中都会以 warn 记录。
//! 多个候选时取路径层级最少者，层级相同按字典序。

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::core::{sanitize_relative, ForgeError, Session};

/// 扫描时跳过的目录（依赖安装产物、缓存、VCS）
const IGNORED_DIRS: &[&str] = &["node_modules", ".venv", "venv", "__pycache__", ".git", ".pytest_cache", "dist"];

#[derive(Debug, Clone)]
pub struct CodeFile {
    /// 相对 code 目录的路径，统一用 `/` 分隔
    pub relative: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

fn relative_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// 列出代码树中所有文件，按相对路径排序
pub fn list_code_files(code_dir: &Path) -> Vec<CodeFile> {
    let mut files: Vec<CodeFile> = WalkDir::new(code_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && IGNORED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().ends_with(".tmp"))
        .filter_map(|e| {
            let relative = relative_string(code_dir, e.path())?;
            let modified = e
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some(CodeFile {
                relative,
                path: e.path().to_path_buf(),
                modified,
            })
        })
        .collect();
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub relative: String,
    pub path: PathBuf,
    /// 通过后缀搜索找到（非规范路径）
    pub nested_match: bool,
}

/// 解析任务文件名到会话代码树中的实际路径
pub fn resolve_target(session: &Session, file_name: &str) -> Result<ResolvedTarget, ForgeError> {
    let rel = sanitize_relative(file_name)?;
    let canonical = session.code_dir().join(&rel);
    let canonical_rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if canonical.is_file() {
        return Ok(ResolvedTarget {
            relative: canonical_rel,
            path: canonical,
            nested_match: false,
        });
    }

    let suffix = format!("/{}", canonical_rel);
    let best = list_code_files(&session.code_dir())
        .into_iter()
        .filter(|f| f.relative.ends_with(&suffix))
        .min_by(|a, b| {
            let depth = |f: &CodeFile| f.relative.matches('/').count();
            depth(a).cmp(&depth(b)).then_with(|| a.relative.cmp(&b.relative))
        });

    match best {
        Some(found) => {
            tracing::warn!(requested = %canonical_rel, matched = %found.relative, "nested filename match");
            Ok(ResolvedTarget {
                relative: found.relative,
                path: found.path,
                nested_match: true,
            })
        }
        None => Ok(ResolvedTarget {
            relative: canonical_rel,
            path: canonical,
            nested_match: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(files: &[&str]) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), "s").unwrap();
        for f in files {
            let p = session.code_dir().join(f);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "x").unwrap();
        }
        (dir, session)
    }

    #[test]
    fn test_canonical_path_preferred() {
        let (_dir, session) = session_with(&["app.py", "backend/app.py"]);
        let t = resolve_target(&session, "app.py").unwrap();
        assert_eq!(t.relative, "app.py");
        assert!(!t.nested_match);
    }

    #[test]
    fn test_nested_match_tie_break() {
        let (_dir, session) = session_with(&["zeta/app.py", "alpha/app.py", "alpha/deep/app.py"]);
        let t = resolve_target(&session, "app.py").unwrap();
        assert_eq!(t.relative, "alpha/app.py");
        assert!(t.nested_match);
    }

    #[test]
    fn test_suffix_match_respects_component_boundary() {
        let (_dir, session) = session_with(&["backend/myapp.py"]);
        let t = resolve_target(&session, "app.py").unwrap();
        assert_eq!(t.relative, "app.py");
        assert!(!t.nested_match);
    }

    #[test]
    fn test_list_skips_ignored_dirs() {
        let (_dir, session) = session_with(&["src/index.js", "node_modules/react/index.js", "package.json"]);
        let names: Vec<String> = list_code_files(&session.code_dir()).into_iter().map(|f| f.relative).collect();
        assert_eq!(names, vec!["package.json", "src/index.js"]);
    }

    #[test]
    fn test_escape_rejected() {
        let (_dir, session) = session_with(&[]);
        assert!(resolve_target(&session, "../outside.py").is_err());
    }
}
