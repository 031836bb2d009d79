//! Planner：生成高层计划（一次性，失败即中止运行）

use crate::core::ForgeError;
use crate::llm::generate_structured;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::Plan;
use crate::pipeline::Services;

pub const PLAN_FILE: &str = "plan_output.json";

pub async fn run(state: &mut PipelineState, services: &Services) -> Result<(), ForgeError> {
    let prompt = format!(
        "You are a senior software architect. Produce a development plan for the request below.\n\
         Choose tech_stack: `python` for Python-only projects, `node` for JavaScript/TypeScript-only \
         projects, `fullstack` for a JavaScript frontend with a Python backend.\n\
         Keep steps high level; every step must be verifiable by automated tests.\n\n\
         Request:\n{}",
        state.user_prompt
    );
    let plan: Plan = generate_structured(services.llm.as_ref(), &prompt)
        .await
        .map_err(|e| ForgeError::generation("planner", e))?;

    state.session.write_plan_json(PLAN_FILE, &plan).await?;
    tracing::info!(goal = %plan.project_goal, stack = ?plan.tech_stack, steps = plan.steps.len(), "plan ready");
    state.plan = Some(plan);
    Ok(())
}
