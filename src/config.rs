//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORGE__*` 覆盖（双下划线表示嵌套，如 `FORGE__PIPELINE__RETRY_CAP=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub sandbox: SandboxSection,
    pub research: ResearchSection,
    pub memory: MemorySection,
    pub registries: RegistriesSection,
}

/// [app] 段：输出根目录与单次运行的节点步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 会话目录根，未设置时用 ./output
    pub output_root: PathBuf,
    /// 状态机最多执行的节点步数（防止异常配置下无限循环）
    pub max_steps: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            max_steps: 200,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 嵌入模型；为空时语义记忆退化为关键词检索
    pub embedding_model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            request_timeout_secs: 120,
            embedding_model: None,
        }
    }
}

/// [pipeline] 段：修复循环上限与 Debugger 上下文规模
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub retry_cap: u32,
    /// 修复计划与上一轮完全相同时提前结束
    pub stop_on_repeated_fix: bool,
    pub debug_context_files: usize,
    pub debug_context_chars: usize,
    pub error_truncate_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            retry_cap: 3,
            stop_on_repeated_fix: false,
            debug_context_files: 3,
            debug_context_chars: 3000,
            error_truncate_chars: 500,
        }
    }
}

/// [sandbox] 段：沙箱根目录、注册表路径与命令超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub root: PathBuf,
    pub registry_path: PathBuf,
    pub install_timeout_secs: u64,
    pub test_timeout_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sandboxes"),
            registry_path: PathBuf::from("active_sandboxes.json"),
            install_timeout_secs: 180,
            test_timeout_secs: 60,
        }
    }
}

/// [research] 段：实时搜索端点、结果规模、域名过滤、文档集合
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub search_api_url: String,
    /// API Key 的环境变量名
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
    /// 语义回退时查询的共享文档集合
    pub docs_collection: String,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            search_api_url: "https://api.tavily.com/search".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            timeout_secs: 15,
            max_results: 3,
            max_result_chars: 6000,
            allowed_domains: default_allowed_domains(),
            docs_collection: "docs".to_string(),
        }
    }
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        "docs.python.org".into(),
        "pypi.org".into(),
        "flask.palletsprojects.com".into(),
        "fastapi.tiangolo.com".into(),
        "docs.pytest.org".into(),
        "www.npmjs.com".into(),
        "nodejs.org".into(),
        "react.dev".into(),
        "developer.mozilla.org".into(),
        "jestjs.io".into(),
        "vitejs.dev".into(),
        "stackoverflow.com".into(),
        "github.com".into(),
    ]
}

/// [memory] 段：后台索引并发、分块参数与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub indexing_workers: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// 余弦相似度低于该值的检索结果被丢弃（仅嵌入模式）
    pub min_similarity: f32,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            indexing_workers: 3,
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 5,
            min_similarity: 0.35,
        }
    }
}

/// [registries] 段：公共包注册表地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistriesSection {
    pub pypi_url: String,
    pub npm_url: String,
    pub timeout_secs: u64,
}

impl Default for RegistriesSection {
    fn default() -> Self {
        Self {
            pypi_url: "https://pypi.org/pypi".to_string(),
            npm_url: "https://registry.npmjs.org".to_string(),
            timeout_secs: 10,
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
