//! Forge - 从自然语言需求到可运行、经过测试的多文件代码
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 致命错误、会话目录、运行监管、文本工具
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）、结构化生成、嵌入
//! - **memory**: 会话级语义代码记忆与后台索引
//! - **research**: 实时搜索 → 语义存储 → 「未找到」的文档检索
//! - **sandbox**: 沙箱抽象、注册表、运行模板
//! - **pipeline**: 编排状态机与各节点
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod research;
pub mod sandbox;

pub use pipeline::{Orchestrator, PipelineState, RunReport, Services};
