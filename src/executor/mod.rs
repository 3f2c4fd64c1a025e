//! Reactive executors
//!
//! An executor is a persona (system prompt + tool registry) driving a
//! bounded reason/act loop. Each iteration asks the reasoning client for the
//! next message; an action marker dispatches a tool and feeds the stringified
//! result back as an observation, anything else is the final answer. The
//! loop is capped so a confused model cannot spin forever.

use crate::error::AgentError;
use crate::llm::ReasoningClient;
use crate::models::{ChatTurn, ExecutorProfile, ERROR_MARKER, PAUSE_MARKER};
use crate::tools::{ToolArgs, ToolRegistry};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod action;
pub use action::{parse_action, ActionInvocation};

/// Reasoning-call budget per task.
const MAX_ITERATIONS: usize = 4;

/// Returned when the budget is spent without a final answer. Carries the
/// error marker so a plan treats it as a failed step.
pub const LOOP_MAXED_OUT: &str =
    "Error: reasoning loop exhausted its budget without a final answer";

const ACTION_SYNTAX_HELP: &str =
    r#"To use a tool, reply with a single line: ACTION: tool_name {"arg": "value"}"#;

pub struct ReactiveExecutor {
    name: &'static str,
    profile: ExecutorProfile,
    system_prompt: String,
    llm: Arc<dyn ReasoningClient>,
    registry: Arc<ToolRegistry>,
}

impl ReactiveExecutor {
    pub fn new(
        name: &'static str,
        profile: ExecutorProfile,
        role_prompt: &str,
        llm: Arc<dyn ReasoningClient>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let tools = registry.list().join(", ");
        let system_prompt = format!(
            "{role}\n\nAvailable tools: {tools}.\n{syntax}\n\
             When you have everything you need, reply with the final answer \
             and no ACTION line.",
            role = role_prompt,
            tools = tools,
            syntax = ACTION_SYNTAX_HELP,
        );

        Self {
            name,
            profile,
            system_prompt,
            llm,
            registry,
        }
    }

    pub fn engineering(llm: Arc<dyn ReasoningClient>, registry: Arc<ToolRegistry>) -> Self {
        Self::new(
            "engineering",
            ExecutorProfile::Engineering,
            "You are a senior software engineer. Inspect files and directories \
             before drawing conclusions, and keep answers grounded in what the \
             tools returned.",
            llm,
            registry,
        )
    }

    pub fn scribe(llm: Arc<dyn ReasoningClient>, registry: Arc<ToolRegistry>) -> Self {
        Self::new(
            "scribe",
            ExecutorProfile::Scribe,
            "You are a meticulous note keeper. Log, save, and retrieve notes \
             from the vault exactly as asked, preserving the user's wording.",
            llm,
            registry,
        )
    }

    pub fn research(llm: Arc<dyn ReasoningClient>, registry: Arc<ToolRegistry>) -> Self {
        Self::new(
            "research",
            ExecutorProfile::Research,
            "You are a research analyst. Gather the relevant material, then \
             answer concisely with the key facts first.",
            llm,
            registry,
        )
    }

    pub fn general(llm: Arc<dyn ReasoningClient>, registry: Arc<ToolRegistry>) -> Self {
        Self::new(
            "general",
            ExecutorProfile::General,
            "You are a capable general assistant. Use tools when they help, \
             otherwise answer directly.",
            llm,
            registry,
        )
    }

    pub fn profile(&self) -> ExecutorProfile {
        self.profile
    }

    /// Run the reason/act loop for one task.
    ///
    /// Returns the final answer, a pause-marker message when a gated tool
    /// deferred the work for approval, or [`LOOP_MAXED_OUT`] once the
    /// iteration budget is spent.
    pub async fn run(&self, task: &str, prior_context: &[ChatTurn]) -> Result<String> {
        let mut messages = Vec::with_capacity(prior_context.len() + 2);
        messages.push(ChatTurn::system(self.system_prompt.clone()));
        messages.extend_from_slice(prior_context);
        messages.push(ChatTurn::user(task));

        for iteration in 1..=MAX_ITERATIONS {
            debug!(executor = self.name, iteration, "Reasoning iteration");

            let reply = self.llm.converse(&messages).await?;

            let invocation = match parse_action(&reply) {
                Ok(None) => {
                    debug!(executor = self.name, iteration, "Final answer produced");
                    return Ok(reply);
                }
                Ok(Some(invocation)) => invocation,
                Err(AgentError::MalformedAction(reason)) => {
                    warn!(executor = self.name, %reason, "Malformed action line");
                    messages.push(ChatTurn::assistant(reply));
                    messages.push(ChatTurn::user(format!(
                        "Observation: {} malformed action ({}). {}",
                        ERROR_MARKER, reason, ACTION_SYNTAX_HELP
                    )));
                    continue;
                }
                Err(e) => return Err(e),
            };

            info!(
                executor = self.name,
                tool = %invocation.tool,
                "Dispatching action"
            );
            messages.push(ChatTurn::assistant(reply));

            let observation = match self
                .registry
                .execute(&invocation.tool, &ToolArgs::new(invocation.args))
                .await
            {
                Ok(result) => result.render(),
                Err(AgentError::ToolNotFound(name)) => {
                    format!(
                        "{} unknown tool '{}'. Available tools: {}. {}",
                        ERROR_MARKER,
                        name,
                        self.registry.list().join(", "),
                        ACTION_SYNTAX_HELP
                    )
                }
                Err(AgentError::InvalidToolInput(reason)) => {
                    format!("{} invalid tool arguments: {}", ERROR_MARKER, reason)
                }
                Err(e) => return Err(e),
            };

            // A paused action ends the task immediately; the approval flow
            // owns it from here.
            if observation.contains(PAUSE_MARKER) {
                info!(executor = self.name, "Action deferred for approval");
                return Ok(observation);
            }

            messages.push(ChatTurn::user(format!("Observation: {}", observation)));
        }

        warn!(executor = self.name, "Iteration budget exhausted");
        Ok(LOOP_MAXED_OUT.to_string())
    }
}

/// The full set of executor personas, keyed by profile. Lookup never fails;
/// unrecognized profiles resolve to the general executor.
pub struct ExecutorSet {
    executors: HashMap<ExecutorProfile, Arc<ReactiveExecutor>>,
}

impl ExecutorSet {
    pub fn new(llm: Arc<dyn ReasoningClient>, registry: Arc<ToolRegistry>) -> Self {
        let mut executors: HashMap<ExecutorProfile, Arc<ReactiveExecutor>> = HashMap::new();
        executors.insert(
            ExecutorProfile::Engineering,
            Arc::new(ReactiveExecutor::engineering(llm.clone(), registry.clone())),
        );
        executors.insert(
            ExecutorProfile::Scribe,
            Arc::new(ReactiveExecutor::scribe(llm.clone(), registry.clone())),
        );
        executors.insert(
            ExecutorProfile::Research,
            Arc::new(ReactiveExecutor::research(llm.clone(), registry.clone())),
        );
        executors.insert(
            ExecutorProfile::General,
            Arc::new(ReactiveExecutor::general(llm, registry)),
        );
        Self { executors }
    }

    pub fn get(&self, profile: ExecutorProfile) -> Arc<ReactiveExecutor> {
        self.executors
            .get(&profile)
            .or_else(|| self.executors.get(&ExecutorProfile::General))
            .cloned()
            .expect("general executor is always registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ProposalGate;
    use crate::channel::InMemoryChannel;
    use crate::llm::MockReasoningClient;
    use crate::tools::{create_default_registry, NoteVault};

    fn test_registry() -> Arc<ToolRegistry> {
        let (channel, _rx) = InMemoryChannel::new();
        let gate = Arc::new(ProposalGate::new(Arc::new(channel), "approvals"));
        Arc::new(create_default_registry(Arc::new(NoteVault::new()), gate))
    }

    #[tokio::test]
    async fn test_direct_answer_short_circuits() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_reply(Ok("Paris is the capital of France.".to_string()));

        let executor = ReactiveExecutor::general(llm, test_registry());
        let answer = executor.run("capital of France?", &[]).await.unwrap();
        assert_eq!(answer, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn test_action_then_answer() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_reply(Ok("ACTION: list_directory {}".to_string()));
        llm.push_reply(Ok("The vault holds two notes.".to_string()));

        let executor = ReactiveExecutor::general(llm, test_registry());
        let answer = executor.run("what notes exist?", &[]).await.unwrap();
        assert_eq!(answer, "The vault holds two notes.");
    }

    #[tokio::test]
    async fn test_unknown_tool_triggers_self_correction() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_reply(Ok("ACTION: teleport {}".to_string()));
        llm.push_reply(Ok("Never mind, answering directly.".to_string()));

        let executor = ReactiveExecutor::general(llm, test_registry());
        let answer = executor.run("do something", &[]).await.unwrap();
        assert_eq!(answer, "Never mind, answering directly.");
    }

    #[tokio::test]
    async fn test_malformed_action_triggers_self_correction() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_reply(Ok("ACTION: read_file {broken".to_string()));
        llm.push_reply(Ok(r#"ACTION: read_file {"path": "daily_log.md"}"#.to_string()));
        llm.push_reply(Ok("The log mentions open positions.".to_string()));

        let executor = ReactiveExecutor::general(llm, test_registry());
        let answer = executor.run("read my log", &[]).await.unwrap();
        assert_eq!(answer, "The log mentions open positions.");
    }

    #[tokio::test]
    async fn test_gated_action_pauses_immediately() {
        let llm = Arc::new(MockReasoningClient::new());
        llm.push_reply(Ok(
            r#"ACTION: write_file {"path": "x.md", "content": "y"}"#.to_string()
        ));

        let executor = ReactiveExecutor::scribe(llm, test_registry());
        let answer = executor.run("save a note", &[]).await.unwrap();
        assert!(answer.contains(PAUSE_MARKER));
    }

    #[tokio::test]
    async fn test_loop_maxes_out_after_four_iterations() {
        let llm = Arc::new(MockReasoningClient::new());
        for _ in 0..MAX_ITERATIONS {
            llm.push_reply(Ok("ACTION: list_directory {}".to_string()));
        }

        let executor = ReactiveExecutor::general(llm, test_registry());
        let answer = executor.run("spin", &[]).await.unwrap();
        assert_eq!(answer, LOOP_MAXED_OUT);
        assert!(answer.starts_with(ERROR_MARKER));
    }

    #[tokio::test]
    async fn test_executor_set_defaults_to_general() {
        let llm = Arc::new(MockReasoningClient::new());
        let set = ExecutorSet::new(llm, test_registry());
        assert_eq!(
            set.get(ExecutorProfile::General).profile(),
            ExecutorProfile::General
        );
        assert_eq!(
            set.get(ExecutorProfile::Scribe).profile(),
            ExecutorProfile::Scribe
        );
    }
}
