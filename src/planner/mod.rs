//! Architect planner and sequential plan execution
//!
//! The planner asks the reasoning client for a structured decomposition,
//! retrying a bounded number of times, then walks the steps in order.
//! Each step runs on the executor its profile names, with the original
//! request and every earlier observation folded into its task context.
//! A paused or failed step halts the walk; completed work is never redone.

use crate::executor::ExecutorSet;
use crate::llm::ReasoningClient;
use crate::models::{
    ExecutorProfile, Plan, PlanStatus, PlanStep, StepStatus, ERROR_MARKER, PAUSE_MARKER,
};
use crate::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at getting a usable decomposition before giving up.
const MAX_PLAN_ATTEMPTS: usize = 3;

/// Returned verbatim when every planning attempt failed. Nothing executes.
pub const PLANNING_FAILED: &str =
    "I couldn't produce a workable plan for that request. Try rephrasing it or breaking it into smaller pieces.";

pub struct Planner {
    llm: Arc<dyn ReasoningClient>,
    executors: Arc<ExecutorSet>,
}

impl Planner {
    pub fn new(llm: Arc<dyn ReasoningClient>, executors: Arc<ExecutorSet>) -> Self {
        Self { llm, executors }
    }

    /// Decompose the request and run the resulting plan to its terminal
    /// status. The returned transcript covers rationale, step assignments,
    /// observations, and the final status, including partial runs.
    pub async fn plan_and_execute(&self, request: &str) -> Result<String> {
        let Some(mut plan) = self.build_plan(request).await else {
            return Ok(PLANNING_FAILED.to_string());
        };

        self.execute(&mut plan).await?;
        Ok(render_transcript(&plan))
    }

    /// Planning phase. Empty step lists and schema or transport failures
    /// both burn an attempt; exhaustion yields `None`.
    async fn build_plan(&self, request: &str) -> Option<Plan> {
        for attempt in 1..=MAX_PLAN_ATTEMPTS {
            match self.llm.plan(request).await {
                Ok(outline) if outline.steps.is_empty() => {
                    warn!(attempt, "Architect returned an empty step list");
                }
                Ok(outline) => {
                    info!(
                        attempt,
                        step_count = outline.steps.len(),
                        "Plan accepted"
                    );

                    let steps = outline
                        .steps
                        .into_iter()
                        .enumerate()
                        .map(|(i, step)| PlanStep {
                            index: i as u32 + 1,
                            profile: ExecutorProfile::parse(&step.profile),
                            action: step.action,
                            tool_hint: step.tool,
                            status: StepStatus::Pending,
                            observation: String::new(),
                        })
                        .collect();

                    return Some(Plan {
                        rationale: outline.rationale,
                        original_request: request.to_string(),
                        steps,
                        status: PlanStatus::Executing,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Planning attempt failed");
                }
            }
        }

        warn!("All planning attempts exhausted");
        None
    }

    /// Execution phase: strict index order, halt on pause or failure.
    async fn execute(&self, plan: &mut Plan) -> Result<()> {
        for i in 0..plan.steps.len() {
            let task = step_context(plan, i);
            let step = &plan.steps[i];
            let executor = self.executors.get(step.profile);

            info!(
                step = step.index,
                profile = %step.profile,
                "Executing plan step"
            );

            let observation = executor.run(&task, &[]).await?;
            let step = &mut plan.steps[i];
            step.observation = observation;

            if step.observation.contains(PAUSE_MARKER) {
                info!(step = step.index, "Plan paused for approval");
                plan.status = PlanStatus::PausedForApproval;
                return Ok(());
            }

            if step.observation.contains(ERROR_MARKER) {
                warn!(step = step.index, "Plan step failed");
                step.status = StepStatus::Failed;
                plan.status = PlanStatus::Failed;
                return Ok(());
            }

            step.status = StepStatus::Success;
        }

        plan.status = PlanStatus::Completed;
        Ok(())
    }
}

/// Task context for step `i`: the overall objective, every earlier
/// non-empty observation, then the step's own action.
fn step_context(plan: &Plan, i: usize) -> String {
    let mut context = format!("Overall objective: {}\n", plan.original_request);

    let prior: Vec<&PlanStep> = plan.steps[..i]
        .iter()
        .filter(|s| !s.observation.is_empty())
        .collect();
    if !prior.is_empty() {
        context.push_str("\nCompleted so far:\n");
        for step in prior {
            let _ = writeln!(context, "Step {}: {}", step.index, step.observation);
        }
    }

    let _ = write!(context, "\nYour step: {}", plan.steps[i].action);
    context
}

fn render_transcript(plan: &Plan) -> String {
    let mut out = format!("**Plan rationale:** {}\n\n", plan.rationale);

    for step in &plan.steps {
        let _ = writeln!(
            out,
            "{}. [{}] {} (tool: {})",
            step.index, step.profile, step.action, step.tool_hint
        );
    }

    out.push('\n');
    for step in plan.steps.iter().filter(|s| !s.observation.is_empty()) {
        let _ = writeln!(out, "**Step {} result:** {}", step.index, step.observation);
    }

    let status = match plan.status {
        PlanStatus::Planning => "PLANNING",
        PlanStatus::Executing => "EXECUTING",
        PlanStatus::PausedForApproval => "PAUSED_FOR_APPROVAL",
        PlanStatus::Failed => "FAILED",
        PlanStatus::Completed => "COMPLETED",
    };
    let _ = write!(out, "\n**Status:** {}", status);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ProposalGate;
    use crate::channel::InMemoryChannel;
    use crate::error::AgentError;
    use crate::llm::{MockReasoningClient, OutlineStep, PlanOutline};
    use crate::tools::{create_default_registry, NoteVault, ToolRegistry};

    fn test_registry() -> Arc<ToolRegistry> {
        let (channel, _rx) = InMemoryChannel::new();
        let gate = Arc::new(ProposalGate::new(Arc::new(channel), "approvals"));
        Arc::new(create_default_registry(Arc::new(NoteVault::new()), gate))
    }

    fn planner_with(llm: Arc<MockReasoningClient>) -> Planner {
        let executors = Arc::new(ExecutorSet::new(llm.clone(), test_registry()));
        Planner::new(llm, executors)
    }

    fn outline(steps: Vec<(&str, &str, &str)>) -> PlanOutline {
        PlanOutline {
            rationale: "break the work into steps".to_string(),
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, (profile, action, tool))| OutlineStep {
                    index: i as u32 + 1,
                    profile: profile.to_string(),
                    action: action.to_string(),
                    tool: tool.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_planning_retries_until_usable_outline() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_plan(Err(AgentError::SchemaValidation("not json".to_string())));
        llm.push_plan(Ok(outline(vec![])));
        llm.push_plan(Ok(outline(vec![(
            "general",
            "summarize the vault",
            "list_directory",
        )])));
        llm.push_reply(Ok("The vault holds two notes.".to_string()));

        let planner = planner_with(llm);
        let transcript = planner.plan_and_execute("summarize my notes").await.unwrap();
        assert!(transcript.contains("The vault holds two notes."));
        assert!(transcript.contains("COMPLETED"));
    }

    #[tokio::test]
    async fn test_planning_exhaustion_returns_fixed_message() {
        let llm = Arc::new(MockReasoningClient::new());
        for _ in 0..3 {
            llm.push_plan(Ok(outline(vec![])));
        }

        let planner = planner_with(llm);
        let reply = planner.plan_and_execute("do a thing").await.unwrap();
        assert_eq!(reply, PLANNING_FAILED);
    }

    #[tokio::test]
    async fn test_two_step_plan_accumulates_context() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_plan(Ok(outline(vec![
            ("research", "find the topic", "search_notes"),
            ("scribe", "summarize findings", "read_file"),
        ])));
        llm.push_reply(Ok("Topic found: orchestrator notes.".to_string()));
        llm.push_reply(Ok("Summary written.".to_string()));

        let planner = planner_with(llm);
        let transcript = planner.plan_and_execute("research then summarize").await.unwrap();

        assert!(transcript.contains("Topic found: orchestrator notes."));
        assert!(transcript.contains("Summary written."));
        assert!(transcript.contains("COMPLETED"));
    }

    #[tokio::test]
    async fn test_failed_step_halts_execution() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_plan(Ok(outline(vec![
            ("general", "first step", "read_file"),
            ("general", "second step", "read_file"),
        ])));
        // Only the first step gets a scripted reply; a run past it would
        // surface an unscripted-call error.
        llm.push_reply(Ok("Error: the source file is corrupt".to_string()));

        let planner = planner_with(llm);
        let transcript = planner.plan_and_execute("doomed request").await.unwrap();
        assert!(transcript.contains("FAILED"));
        assert!(transcript.contains("the source file is corrupt"));
        assert!(!transcript.contains("Step 2 result:"));
    }

    #[tokio::test]
    async fn test_pause_on_second_step_preserves_first() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_plan(Ok(outline(vec![
            ("research", "gather material", "search_notes"),
            ("scribe", "write the summary file", "write_file"),
        ])));
        llm.push_reply(Ok("Material gathered.".to_string()));
        llm.push_reply(Ok(
            r#"ACTION: write_file {"path": "summary.md", "content": "draft"}"#.to_string(),
        ));

        let planner = planner_with(llm);
        let transcript = planner.plan_and_execute("gather and save").await.unwrap();

        assert!(transcript.contains("Material gathered."));
        assert!(transcript.contains(PAUSE_MARKER));
        assert!(transcript.contains("PAUSED_FOR_APPROVAL"));
    }
}
