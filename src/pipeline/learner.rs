//! Learner：learn 路由的占位节点，直接进入终态

use crate::pipeline::state::PipelineState;

pub const LEARN_NOT_AVAILABLE: &str = "Learning mode is not available yet; rephrase the request as a build or debug task.";

pub fn run(state: &mut PipelineState) {
    tracing::info!("learn route requested, nothing to do");
    state.answer = Some(LEARN_NOT_AVAILABLE.to_string());
}
