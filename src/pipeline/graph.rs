//! 编排图：节点、条件路由与主循环
//!
//! 单个逻辑线程按顺序驱动状态机，同一会话的节点从不重叠。路由函数都是纯函数，便于单独测试。
//! 只有 Evaluator 判定的执行失败会进入修复循环，循环次数受 retry_cap 限制；
//! Planner / Architect 的生成失败直接中止运行。

use tokio_util::sync::CancellationToken;

use crate::config::PipelineSection;
use crate::core::ForgeError;
use crate::pipeline::state::{PipelineState, RunReport};
use crate::pipeline::types::{EvalStatus, Route};
use crate::pipeline::{
    architect, coder, debugger, dependency, evaluator, executor, learner, planner, qa, router, Services,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Router,
    Planner,
    Architect,
    Coder,
    Qa,
    DependencyValidator,
    Executor,
    Evaluator,
    Debugger,
    Learner,
    Terminal,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Planner => "planner",
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Qa => "qa",
            Self::DependencyValidator => "dependency_validator",
            Self::Executor => "executor",
            Self::Evaluator => "evaluator",
            Self::Debugger => "debugger",
            Self::Learner => "learner",
            Self::Terminal => "terminal",
        }
    }
}

pub fn route_after_router(route: Route) -> Node {
    match route {
        Route::Build => Node::Planner,
        Route::Debug => Node::Debugger,
        Route::Learn => Node::Learner,
    }
}

/// cursor < len ⇒ 继续 Coder；否则首轮进 QA，修复轮进依赖校验
pub fn route_after_coder(cursor: usize, queue_len: usize, iteration_count: u32) -> Node {
    if cursor < queue_len {
        Node::Coder
    } else if iteration_count == 0 {
        Node::Qa
    } else {
        Node::DependencyValidator
    }
}

/// 校验产生了失败结果 ⇒ 直接评估，跳过沙箱
pub fn route_after_validator(produced_failure: bool) -> Node {
    if produced_failure {
        Node::Evaluator
    } else {
        Node::Executor
    }
}

pub fn route_after_evaluator(status: EvalStatus, iteration_count: u32, retry_cap: u32) -> Node {
    if status == EvalStatus::Fail && iteration_count < retry_cap {
        Node::Debugger
    } else {
        Node::Terminal
    }
}

/// 根据刚执行完的节点与当前状态决定下一个节点
pub fn next_node(current: Node, state: &PipelineState, cfg: &PipelineSection) -> Node {
    match current {
        Node::Router => route_after_router(state.route),
        Node::Planner => Node::Architect,
        Node::Architect => Node::Coder,
        Node::Coder => route_after_coder(state.queue.cursor(), state.queue.len(), state.iteration_count),
        Node::Qa => Node::DependencyValidator,
        Node::DependencyValidator => route_after_validator(state.execution_result.is_some()),
        Node::Executor => Node::Evaluator,
        Node::Evaluator => route_after_evaluator(state.status, state.iteration_count, cfg.retry_cap),
        Node::Debugger if state.stop_reason.is_some() => Node::Terminal,
        Node::Debugger => Node::Coder,
        Node::Learner | Node::Terminal => Node::Terminal,
    }
}

pub struct Orchestrator<'a> {
    services: &'a Services,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(services: &'a Services, cancel: CancellationToken) -> Self {
        Self { services, cancel }
    }

    async fn step(&self, node: Node, state: &mut PipelineState) -> Result<(), ForgeError> {
        let services = self.services;
        match node {
            Node::Router => router::run(state, services).await,
            Node::Planner => planner::run(state, services).await?,
            Node::Architect => architect::run(state, services).await?,
            Node::Coder => coder::run(state, services).await?,
            Node::Qa => qa::run(state, services).await?,
            Node::DependencyValidator => dependency::run(state, services).await,
            Node::Executor => executor::run(state, services).await,
            Node::Evaluator => evaluator::run(state, services).await,
            Node::Debugger => debugger::run(state, services).await?,
            Node::Learner => learner::run(state),
            Node::Terminal => {}
        }
        Ok(())
    }

    /// 从 Router 开始驱动状态机直到终态
    pub async fn run(&self, state: &mut PipelineState) -> Result<RunReport, ForgeError> {
        let result = self.drive(state).await;
        self.services.indexer.flush().await;
        let usage = self.services.llm.token_usage();
        tracing::info!(total_tokens = usage.total_tokens, "llm usage");
        result.map(|_| RunReport {
            token_usage: usage,
            ..state.report()
        })
    }

    async fn drive(&self, state: &mut PipelineState) -> Result<(), ForgeError> {
        let max_steps = self.services.config.app.max_steps;
        let mut node = Node::Router;
        let mut steps = 0usize;

        while node != Node::Terminal {
            if self.cancel.is_cancelled() {
                return Err(ForgeError::Cancelled);
            }
            if steps >= max_steps {
                return Err(ForgeError::StepLimit(max_steps));
            }
            steps += 1;

            tracing::info!(
                session = %state.session.id(),
                node = node.name(),
                iteration = state.iteration_count,
                "entering node"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ForgeError::Cancelled),
                r = self.step(node, state) => r?,
            }
            node = next_node(node, state, &self.services.config.pipeline);
        }

        tracing::info!(
            session = %state.session.id(),
            status = ?state.status,
            iteration = state.iteration_count,
            steps,
            "run finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coder_routing_over_all_cursors() {
        for len in 0..5usize {
            for cursor in 0..=len {
                for iteration in 0..3u32 {
                    let next = route_after_coder(cursor, len, iteration);
                    if cursor < len {
                        assert_eq!(next, Node::Coder);
                    } else if iteration == 0 {
                        assert_eq!(next, Node::Qa);
                    } else {
                        assert_eq!(next, Node::DependencyValidator);
                    }
                }
            }
        }
    }

    #[test]
    fn test_router_routing() {
        assert_eq!(route_after_router(Route::Build), Node::Planner);
        assert_eq!(route_after_router(Route::Debug), Node::Debugger);
        assert_eq!(route_after_router(Route::Learn), Node::Learner);
    }

    #[test]
    fn test_validator_routing() {
        assert_eq!(route_after_validator(true), Node::Evaluator);
        assert_eq!(route_after_validator(false), Node::Executor);
    }

    #[test]
    fn test_evaluator_routing_respects_cap() {
        assert_eq!(route_after_evaluator(EvalStatus::Pass, 0, 3), Node::Terminal);
        assert_eq!(route_after_evaluator(EvalStatus::Fail, 1, 3), Node::Debugger);
        assert_eq!(route_after_evaluator(EvalStatus::Fail, 2, 3), Node::Debugger);
        assert_eq!(route_after_evaluator(EvalStatus::Fail, 3, 3), Node::Terminal);
    }
}
