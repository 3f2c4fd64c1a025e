//! Request router
//!
//! Single entry point for inbound requests. Cheap deterministic gates run
//! first, in a fixed priority order, so destructive requests are caught
//! before any model call and trivial greetings never burn tokens. Exactly
//! one arm handles each request; `Ok(None)` means "fall back to open chat".

use crate::approval::ProposalGate;
use crate::config::RoutingRules;
use crate::executor::ExecutorSet;
use crate::llm::ReasoningClient;
use crate::models::{Domain, ExecutorProfile};
use crate::planner::Planner;
use crate::Result;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Returned when a high-risk request cannot be escalated for approval.
/// Denial is the safe default; nothing executes.
pub const APPROVAL_UNAVAILABLE: &str =
    "That looks like a destructive action, and I couldn't reach the approval channel to escalate it. No action was taken.";

pub struct Router {
    llm: Arc<dyn ReasoningClient>,
    planner: Arc<Planner>,
    executors: Arc<ExecutorSet>,
    gate: Arc<ProposalGate>,
    rules: RoutingRules,
}

impl Router {
    pub fn new(
        llm: Arc<dyn ReasoningClient>,
        planner: Arc<Planner>,
        executors: Arc<ExecutorSet>,
        gate: Arc<ProposalGate>,
        rules: RoutingRules,
    ) -> Self {
        Self {
            llm,
            planner,
            executors,
            gate,
            rules,
        }
    }

    /// Route one request. `Ok(None)` hands the turn to open conversation.
    pub async fn route(&self, request: &str) -> Result<Option<String>> {
        let lowered = request.to_lowercase();

        // 1. Trivial greeting shortcut.
        if self.is_greeting(&lowered) {
            info!("Greeting shortcut, deferring to open chat");
            return Ok(None);
        }

        // 2. Destructive verbs force the proposal path before anything else.
        if let Some(keyword) = self
            .rules
            .high_risk_keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
        {
            info!(keyword = %keyword, "High-risk request intercepted");
            return Ok(Some(self.escalate(request, keyword).await));
        }

        // 3. Engineering fast path: straight to the planner, no classification.
        if let Some(keyword) = self
            .rules
            .engineering_keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
        {
            info!(keyword = %keyword, "Engineering fast path");
            return self.planner.plan_and_execute(request).await.map(Some);
        }

        // 4. Browsing is owned by open chat.
        if self
            .rules
            .web_keywords
            .iter()
            .any(|k| lowered.contains(k.as_str()))
        {
            info!("Web request, deferring to open chat");
            return Ok(None);
        }

        // 5. LLM classification. A failed classification is not fatal for
        // the conversation; the request falls through to open chat.
        let decision = match self.llm.classify(request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Classification failed, deferring to open chat");
                return Ok(None);
            }
        };

        info!(domain = ?decision.domain, "Dispatching classified request");
        match decision.domain {
            Domain::Market => {
                let ticker = extract_ticker(&decision.parameters);
                let task = format!(
                    "Give the current market picture for ticker {}: price context, \
                     recent movement, and anything notable.",
                    ticker
                );
                let executor = self.executors.get(ExecutorProfile::Research);
                executor.run(&task, &[]).await.map(Some)
            }
            Domain::Research => {
                let task = format!("Research this topic and report back: {}", decision.parameters);
                let executor = self.executors.get(ExecutorProfile::Research);
                executor.run(&task, &[]).await.map(Some)
            }
            Domain::Notes => {
                let task = notes_task(request, &decision.parameters);
                let executor = self.executors.get(ExecutorProfile::Scribe);
                executor.run(&task, &[]).await.map(Some)
            }
            Domain::Engineering => {
                let executor = self.executors.get(ExecutorProfile::Engineering);
                executor.run(request, &[]).await.map(Some)
            }
            Domain::Chat => Ok(None),
        }
    }

    /// File a proposal for a high-risk request. Escalation failure is a
    /// denial, never silent execution.
    async fn escalate(&self, request: &str, keyword: &str) -> String {
        let mut parameters = HashMap::new();
        parameters.insert("request".to_string(), json!(request));

        let outcome = self
            .gate
            .create_and_publish(
                request,
                format!("Request matched the high-risk keyword '{}'", keyword),
                "Potentially destructive operation requested in chat",
                parameters,
            )
            .await;

        match outcome {
            Ok((proposal, true)) => format!(
                "This needs sign-off first. Proposal [{}] was sent to the '{}' channel.\n\n{}",
                proposal.id,
                self.gate.destination(),
                proposal.render()
            ),
            Ok((_, false)) => APPROVAL_UNAVAILABLE.to_string(),
            Err(e) => {
                warn!(error = %e, "Proposal escalation failed");
                APPROVAL_UNAVAILABLE.to_string()
            }
        }
    }

    /// A message under four words containing a greeting token.
    fn is_greeting(&self, lowered: &str) -> bool {
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.len() >= 4 {
            return false;
        }
        words.iter().any(|w| {
            let token = w.trim_matches(|c: char| !c.is_alphanumeric());
            self.rules.greeting_tokens.iter().any(|g| g == token)
        })
    }
}

/// Deterministic ticker extraction: first token of the classified
/// parameters, uppercased, stripped to the symbol characters.
fn extract_ticker(parameters: &str) -> String {
    parameters
        .split_whitespace()
        .next()
        .unwrap_or(parameters)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect::<String>()
        .to_uppercase()
}

/// Deterministic branch for note handling, keyed off the original text.
fn notes_task(request: &str, parameters: &str) -> String {
    let lowered = request.to_lowercase();
    if lowered.contains("search") || lowered.contains("find") {
        format!("Search the note vault for: {}", parameters)
    } else if lowered.contains("log") || lowered.contains("journal") {
        format!("Append this entry to the daily log: {}", parameters)
    } else {
        format!("Save this as a note in the vault: {}", parameters)
    }
}
