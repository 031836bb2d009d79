//! 代码生成流水线
//!
//! Router → {Planner → Architect → Coder 循环 → QA → 依赖校验 → Executor → Evaluator →（Debugger 修复循环）}
//! | Debugger（直接入口）| Learner（占位）。
//!
//! - **graph**: 节点、纯路由函数与 Orchestrator 主循环
//! - **types / queue / state**: 计划、任务、执行结果、任务队列与运行状态
//! - **services**: 依赖注入的服务句柄
//! - 其余每个文件对应一个节点

pub mod architect;
pub mod coder;
pub mod debugger;
pub mod dependency;
pub mod evaluator;
pub mod executor;
pub mod graph;
pub mod learner;
pub mod planner;
pub mod qa;
pub mod queue;
pub mod registries;
pub mod router;
pub mod services;
pub mod state;
pub mod types;
pub mod workspace;

pub use graph::{next_node, Node, Orchestrator};
pub use queue::TaskQueue;
pub use registries::{Existence, NpmRegistry, PackageRegistry, PyPiRegistry, StaticRegistry};
pub use services::Services;
pub use state::{PipelineState, RunReport};
pub use types::{
    AttemptHistory, DebugTask, ErrorCategory, EvalStatus, ExecutionResult, FileTask, Plan, QaTask, Route, Task,
    TechStack,
};
