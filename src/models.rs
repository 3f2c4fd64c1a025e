//! Core data models for the assistant orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Reserved prefix for action-invocation lines in reasoning output.
pub const ACTION_PREFIX: &str = "ACTION:";

/// Reserved substring in a tool result signaling that execution must halt
/// pending human approval.
pub const PAUSE_MARKER: &str = "Action paused";

/// Reserved prefix for failed tool observations. The planner treats any
/// observation containing it as fatal for the current plan.
pub const ERROR_MARKER: &str = "Error:";

//
// ================= Enums =================
//

/// Specialist domains a request can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Domain {
    Market,
    Research,
    Notes,
    Engineering,
    Chat,
}

impl Domain {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "MARKET" | "TACTICAL" => Domain::Market,
            "RESEARCH" | "INTEL" => Domain::Research,
            "NOTES" | "OPS" => Domain::Notes,
            "ENGINEERING" => Domain::Engineering,
            _ => Domain::Chat,
        }
    }
}

/// Named executor configuration (instruction set + allowed tools) selected
/// by the planner per step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorProfile {
    Engineering,
    Scribe,
    Research,
    General,
}

impl ExecutorProfile {
    /// Lookup with default: unrecognized profile names resolve to General.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "engineering" | "forge" | "code" => ExecutorProfile::Engineering,
            "scribe" | "ops" | "notes" => ExecutorProfile::Scribe,
            "research" | "intel" => ExecutorProfile::Research,
            _ => ExecutorProfile::General,
        }
    }
}

impl fmt::Display for ExecutorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorProfile::Engineering => "engineering",
            ExecutorProfile::Scribe => "scribe",
            ExecutorProfile::Research => "research",
            ExecutorProfile::General => "general",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Planning,
    Executing,
    PausedForApproval,
    Failed,
    Completed,
}

//
// ================= Routing =================
//

/// Routing decision produced once per classified request. Immutable,
/// consumed immediately by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub domain: Domain,
    pub reasoning: String,
    /// The precise entity or query to act on (e.g. a ticker symbol,
    /// a search topic, or note content).
    pub parameters: String,
}

//
// ================= Plan =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Sequential order, 1-based.
    pub index: u32,
    pub profile: ExecutorProfile,
    /// What needs to be done in this step.
    pub action: String,
    /// The tool the architect expects the executor to use.
    pub tool_hint: String,
    #[serde(default = "default_step_status")]
    pub status: StepStatus,
    #[serde(default)]
    pub observation: String,
}

fn default_step_status() -> StepStatus {
    StepStatus::Pending
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// The architect's chain of thought for the decomposition.
    pub rationale: String,
    pub original_request: String,
    /// Non-empty by construction: the planner retries until the reasoning
    /// client produces at least one step.
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
}

//
// ================= Proposal =================
//

/// A pending high-stakes action awaiting human sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Opaque short token, unique per proposal.
    pub id: String,
    pub action: String,
    pub justification: String,
    pub risk_assessment: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
}

impl Proposal {
    pub fn new(
        action: impl Into<String>,
        justification: impl Into<String>,
        risk_assessment: impl Into<String>,
        parameters: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: short_token(),
            action: action.into(),
            justification: justification.into(),
            risk_assessment: risk_assessment.into(),
            parameters,
            created_at: Utc::now(),
            approved: false,
            channel_id: None,
            message_id: None,
        }
    }

    /// Fixed Markdown template sent through the approval channel. Replies
    /// are matched case-insensitively against `approve <id>`.
    pub fn render(&self) -> String {
        format!(
            "### ACTION PROPOSAL [{id}]\n\
             **Action:** `{action}`\n\n\
             **Justification:** {justification}\n\
             **Risk:** {risk}\n\n\
             ### ACTION REQUIRED: Reply exactly with 'approve {id}' to execute.",
            id = self.id,
            action = self.action,
            justification = self.justification,
            risk = self.risk_assessment,
        )
    }
}

/// 8-hex-char token carved from a v4 UUID.
fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Stringify the result for the executor's observation feedback.
    pub fn render(&self) -> String {
        if self.success {
            match &self.output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        } else {
            format!(
                "{} {}",
                ERROR_MARKER,
                self.error.as_deref().unwrap_or("tool execution failed")
            )
        }
    }
}

//
// ================= Chat =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of prior conversational context fed to an executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
