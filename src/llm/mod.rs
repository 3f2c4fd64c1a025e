//! Reasoning client trait and implementations
//!
//! The reasoning client is the only gateway to the LLM provider. It exposes
//! a free-text conversational mode and a structured mode that validates the
//! model's output against a serde schema before anything downstream sees it.

use crate::models::{ChatTurn, Decision};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub use gemini::GeminiClient;

/// Structured decomposition returned by the architect prompt. Converted
/// into an executable [`crate::models::Plan`] by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutline {
    /// The architect's chain of thought before the step list.
    pub rationale: String,
    pub steps: Vec<OutlineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineStep {
    pub index: u32,
    /// Executor profile name; unrecognized values fall back to `general`.
    pub profile: String,
    pub action: String,
    /// The single tool this step is expected to use.
    pub tool: String,
}

/// Gateway to the LLM provider.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Classify a request into a routing [`Decision`]. Fails with
    /// [`crate::error::AgentError::SchemaValidation`] when the model output
    /// cannot be parsed into the decision schema.
    async fn classify(&self, request: &str) -> Result<Decision>;

    /// Decompose a request into a structured [`PlanOutline`].
    async fn plan(&self, request: &str) -> Result<PlanOutline>;

    /// Free-form next message given the conversation so far.
    async fn converse(&self, messages: &[ChatTurn]) -> Result<String>;
}

/// Scripted reasoning client for tests. Each method pops the next queued
/// response; an empty queue is an LLM error.
pub struct MockReasoningClient {
    classifications: std::sync::Mutex<std::collections::VecDeque<Result<Decision>>>,
    plans: std::sync::Mutex<std::collections::VecDeque<Result<PlanOutline>>>,
    replies: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
}

impl MockReasoningClient {
    pub fn new() -> Self {
        Self {
            classifications: std::sync::Mutex::new(std::collections::VecDeque::new()),
            plans: std::sync::Mutex::new(std::collections::VecDeque::new()),
            replies: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn push_classify(&self, response: Result<Decision>) {
        self.classifications.lock().unwrap().push_back(response);
    }

    pub fn push_plan(&self, response: Result<PlanOutline>) {
        self.plans.lock().unwrap().push_back(response);
    }

    pub fn push_reply(&self, response: Result<String>) {
        self.replies.lock().unwrap().push_back(response);
    }
}

impl Default for MockReasoningClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningClient for MockReasoningClient {
    async fn classify(&self, _request: &str) -> Result<Decision> {
        self.classifications
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(crate::error::AgentError::LlmError(
                    "no scripted classification".to_string(),
                ))
            })
    }

    async fn plan(&self, _request: &str) -> Result<PlanOutline> {
        self.plans.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(crate::error::AgentError::LlmError(
                "no scripted plan".to_string(),
            ))
        })
    }

    async fn converse(&self, _messages: &[ChatTurn]) -> Result<String> {
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(crate::error::AgentError::LlmError(
                "no scripted reply".to_string(),
            ))
        })
    }
}
