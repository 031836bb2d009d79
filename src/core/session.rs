//! 会话目录：output/<session_id>/{plan,code,debug}
//!
//! Session 独占自己的目录树；所有写入都走原子写（临时文件 + rename），相对路径不得逃逸 code 根目录。

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::core::ForgeError;

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    root: PathBuf,
}

impl Session {
    /// 在 output_root 下打开（不存在则创建）会话目录；id 必须是单个普通路径分量
    pub fn open(output_root: impl AsRef<Path>, id: impl Into<String>) -> Result<Self, ForgeError> {
        let id = id.into();
        let mut components = Path::new(&id).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(ForgeError::PathEscape(id));
        }
        let root = output_root.as_ref().join(&id);
        let session = Self { id, root };
        for dir in [session.plan_dir(), session.code_dir(), session.debug_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(session)
    }

    /// 新建会话（uuid v4）
    pub fn create(output_root: impl AsRef<Path>) -> Result<Self, ForgeError> {
        Self::open(output_root, uuid::Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plan_dir(&self) -> PathBuf {
        self.root.join("plan")
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }

    /// 将相对路径解析到 code 目录下；绝对路径或 `..` 视为逃逸
    pub fn code_path(&self, relative: &str) -> Result<PathBuf, ForgeError> {
        Ok(self.code_dir().join(sanitize_relative(relative)?))
    }

    /// 写入 plan/<name>（格式化 JSON）
    pub async fn write_plan_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, ForgeError> {
        let path = self.plan_dir().join(name);
        write_atomic(&path, serde_json::to_string_pretty(value)?.as_bytes()).await?;
        Ok(path)
    }

    /// 写入 debug/fix_plan_iter_<n>.json
    pub async fn write_fix_plan<T: Serialize>(&self, iteration: u32, value: &T) -> Result<PathBuf, ForgeError> {
        let path = self.debug_dir().join(format!("fix_plan_iter_{}.json", iteration));
        write_atomic(&path, serde_json::to_string_pretty(value)?.as_bytes()).await?;
        Ok(path)
    }
}

/// 去掉前导 `./`，拒绝绝对路径与 `..`
pub fn sanitize_relative(relative: &str) -> Result<PathBuf, ForgeError> {
    let trimmed = relative.trim().trim_start_matches("./");
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ForgeError::PathEscape(relative.to_string())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ForgeError::PathEscape(relative.to_string()));
    }
    Ok(out)
}

/// 原子写：同目录临时文件写完后 rename；父目录按需创建
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
