//! Router：把用户请求分到 build / debug / learn；分类失败默认 build

use crate::llm::generate_structured;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{QueryRoute, Route};
use crate::pipeline::Services;

pub async fn run(state: &mut PipelineState, services: &Services) {
    let prompt = format!(
        "Classify the following developer request.\n\
         - build: create new code, projects or features\n\
         - debug: fix an error in existing code\n\
         - learn: a general question that needs an explanation, not code\n\n\
         Request:\n{}",
        state.user_prompt
    );
    state.route = match generate_structured::<QueryRoute>(services.llm.as_ref(), &prompt).await {
        Ok(decision) => decision.route,
        Err(e) => {
            tracing::warn!(error = %e, "routing failed, defaulting to build");
            Route::Build
        }
    };
    tracing::info!(route = ?state.route, "request routed");
}
