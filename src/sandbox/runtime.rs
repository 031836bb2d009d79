//! 运行模板选择：已完成文件的扩展名 → python-base / node-base / node-python-base

use std::path::Path;

use serde::{Deserialize, Serialize};

const PYTHON_EXTS: &[&str] = &["py"];
const NODE_EXTS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx", "vue", "svelte"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeTemplate {
    PythonOnly,
    NodeOnly,
    Hybrid,
}

impl RuntimeTemplate {
    /// 沙箱服务中的模板 id
    pub fn template_id(self) -> &'static str {
        match self {
            Self::PythonOnly => "python-base",
            Self::NodeOnly => "node-base",
            Self::Hybrid => "node-python-base",
        }
    }

    pub fn from_template_id(id: &str) -> Option<Self> {
        match id.trim() {
            "python-base" => Some(Self::PythonOnly),
            "node-base" => Some(Self::NodeOnly),
            "node-python-base" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn needs_python(self) -> bool {
        matches!(self, Self::PythonOnly | Self::Hybrid)
    }

    pub fn needs_node(self) -> bool {
        matches!(self, Self::NodeOnly | Self::Hybrid)
    }
}

/// 纯函数：同时出现 Python 与 Node 信号 → Hybrid；都没有时默认 PythonOnly
pub fn select_runtime(completed_files: &[String]) -> RuntimeTemplate {
    let mut python = false;
    let mut node = false;
    for file in completed_files {
        let path = Path::new(file);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if PYTHON_EXTS.contains(&ext.as_str()) || name == "requirements.txt" || name == "pyproject.toml" {
            python = true;
        }
        if NODE_EXTS.contains(&ext.as_str()) || name == "package.json" {
            node = true;
        }
    }
    match (python, node) {
        (true, true) => RuntimeTemplate::Hybrid,
        (false, true) => RuntimeTemplate::NodeOnly,
        _ => RuntimeTemplate::PythonOnly,
    }
}
