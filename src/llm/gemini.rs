//! Gemini-backed reasoning client
//!
//! Uses a long-lived reqwest::Client for connection pooling. The structured
//! mode instructs the model to emit raw JSON and validates it with serde;
//! anything that does not parse is a typed `SchemaValidation` error, never
//! a silently defaulted decision.

use crate::config::LlmConfig;
use crate::error::AgentError;
use crate::llm::{OutlineStep, PlanOutline, ReasoningClient};
use crate::models::{ChatRole, ChatTurn, Decision, Domain};
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: config.api_key,
            base_url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                config.model
            ),
        }
    }

    async fn generate(&self, system: &str, contents: Vec<Content>) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
        };

        debug!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AgentError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AgentError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .ok_or_else(|| AgentError::LlmError("Empty response from Gemini".to_string()))?;

        Ok(answer)
    }

    /// Structured mode: force raw-JSON output matching `T` and validate it.
    async fn ask_structured<T: DeserializeOwned>(
        &self,
        instructions: &str,
        user_input: &str,
    ) -> Result<T> {
        let system = format!(
            "{}\n\nYou are a precise data output engine. Return ONLY valid JSON \
             matching the requested shape. Do not include markdown formatting \
             (like ```json). Return raw JSON only.",
            instructions
        );

        let raw = self
            .generate(
                &system,
                vec![Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: user_input.to_string(),
                    }],
                }],
            )
            .await?;

        let cleaned = strip_fences(&raw);
        serde_json::from_str(cleaned).map_err(|e| {
            error!("Structured output validation failed: {}", e);
            AgentError::SchemaValidation(format!("{} | raw={}", e, raw))
        })
    }
}

/// Strip a leading/trailing markdown fence the model may emit anyway.
fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[derive(Debug, Deserialize)]
struct DecisionWire {
    domain_name: String,
    reasoning: String,
    task_parameters: String,
}

const CLASSIFY_INSTRUCTIONS: &str = r#"You are the chief of staff for a personal assistant. Route the user request to the correct department.

DEPARTMENTS:
- MARKET: stock prices, tickers, market data. task_parameters MUST be just the ticker symbol (e.g. "NVDA").
- RESEARCH: news, deep dives, current events. task_parameters is the search topic.
- NOTES: logging, journaling, saving notes, searching the note vault. task_parameters is the relevant content.
- ENGINEERING: reviewing or explaining code. task_parameters is the task description.
- CHAT: greetings, small talk, system questions. task_parameters is "chat".

Return JSON: {"domain_name": "...", "reasoning": "...", "task_parameters": "..."}"#;

const PLAN_INSTRUCTIONS: &str = r#"You are the principal systems architect for a personal assistant. Break the user request into a step-by-step execution plan.

Executor profiles: engineering (code and file work), scribe (notes and journals), research (web research), general.

RULES:
1. Keep steps atomic; each step names exactly ONE tool and ONE profile.
2. Do not write code in the plan, only the actions to take.
3. The "steps" array MUST NOT be empty. Generate at least one step.

Return JSON:
{"rationale": "...", "steps": [{"index": 1, "profile": "engineering", "action": "...", "tool": "read_file"}]}"#;

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn classify(&self, request: &str) -> Result<Decision> {
        let wire: DecisionWire = self.ask_structured(CLASSIFY_INSTRUCTIONS, request).await?;

        info!(
            domain = %wire.domain_name,
            "Request classified"
        );

        Ok(Decision {
            domain: Domain::parse(&wire.domain_name),
            reasoning: wire.reasoning,
            parameters: wire.task_parameters,
        })
    }

    async fn plan(&self, request: &str) -> Result<PlanOutline> {
        let outline: PlanOutline = self.ask_structured(PLAN_INSTRUCTIONS, request).await?;

        debug!(step_count = outline.steps.len(), "Plan outline received");

        // Normalize indexes so downstream ordering is reliable even when the
        // model numbers steps loosely.
        let mut steps: Vec<OutlineStep> = outline.steps;
        steps.sort_by_key(|s| s.index);

        Ok(PlanOutline {
            rationale: outline.rationale,
            steps,
        })
    }

    async fn converse(&self, messages: &[ChatTurn]) -> Result<String> {
        let mut system = String::new();
        let mut contents = Vec::new();

        for turn in messages {
            match turn.role {
                ChatRole::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&turn.content);
                }
                ChatRole::User => contents.push(Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                }),
                ChatRole::Assistant => contents.push(Content {
                    role: "model".to_string(),
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                }),
            }
        }

        if contents.is_empty() {
            return Err(AgentError::LlmError(
                "converse requires at least one user turn".to_string(),
            ));
        }

        self.generate(&system, contents).await
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_decision_wire_parses() {
        let wire: DecisionWire = serde_json::from_str(
            r#"{"domain_name": "MARKET", "reasoning": "price query", "task_parameters": "NVDA"}"#,
        )
        .unwrap();
        assert_eq!(Domain::parse(&wire.domain_name), Domain::Market);
        assert_eq!(wire.task_parameters, "NVDA");
    }

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "What moved the market today?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "You are a personal assistant".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("What moved the market today?"));
    }
}
