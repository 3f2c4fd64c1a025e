//! Environment-driven configuration
//!
//! All collaborators receive their configuration by value at construction
//! time; nothing reads the environment after startup.

use std::env;
use std::time::Duration;

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

/// Approval channel settings.
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Base URL of the chat server hosting the approval channel.
    pub server_url: String,
    pub token: String,
    pub team: String,
    /// Channel name where proposals are published and replies observed.
    pub channel: String,
    /// Default wait for `await_approval`.
    pub timeout: Duration,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            token: String::new(),
            team: "operations".to_string(),
            channel: "approvals".to_string(),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Deterministic routing rules evaluated before any LLM call.
///
/// Matching is plain substring containment, first rule wins. This mirrors
/// the production rule set and is a known precision limitation ("move"
/// matches inside "remove", etc.); the enumeration order is load-bearing.
#[derive(Debug, Clone)]
pub struct RoutingRules {
    /// Destructive-action verbs that force the proposal path.
    pub high_risk_keywords: Vec<String>,
    /// Code/file work indicators that dispatch straight to the planner.
    pub engineering_keywords: Vec<String>,
    /// Browsing indicators deferred to general chat.
    pub web_keywords: Vec<String>,
    /// Tokens recognized by the trivial greeting shortcut.
    pub greeting_tokens: Vec<String>,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            high_risk_keywords: to_strings(&[
                "delete",
                "remove",
                "execute",
                "kill",
                "reorganize",
                "move",
                "format",
                "wipe",
            ]),
            engineering_keywords: to_strings(&[
                "engineering",
                "directory",
                "file",
                "codebase",
                "src/",
                "list the",
                "refactor",
                "read",
                "write",
                "prd",
            ]),
            web_keywords: to_strings(&["http://", "https://", "browser", "scrape"]),
            greeting_tokens: to_strings(&["hi", "hello", "hey"]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Unified configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub approval: ApprovalConfig,
    pub routing: RoutingRules,
}

impl AgentConfig {
    /// Assemble configuration from environment variables, falling back to
    /// defaults for anything unset. `.env` loading is the binary's job.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(url) = env::var("APPROVAL_SERVER_URL") {
            config.approval.server_url = url;
        }
        if let Ok(token) = env::var("APPROVAL_TOKEN") {
            config.approval.token = token;
        }
        if let Ok(team) = env::var("APPROVAL_TEAM") {
            config.approval.team = team;
        }
        if let Ok(channel) = env::var("APPROVAL_CHANNEL") {
            config.approval.channel = channel;
        }
        if let Some(secs) = env::var("APPROVAL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.approval.timeout = Duration::from_secs(secs);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_cover_destructive_verbs() {
        let rules = RoutingRules::default();
        for kw in ["delete", "remove", "execute", "kill", "reorganize", "move", "format"] {
            assert!(
                rules.high_risk_keywords.iter().any(|k| k == kw),
                "missing high-risk keyword {kw}"
            );
        }
        assert!(rules.engineering_keywords.iter().any(|k| k == "codebase"));
        assert!(rules.web_keywords.iter().any(|k| k == "browser"));
    }

    #[test]
    fn test_default_timeout_is_one_hour() {
        let config = AgentConfig::default();
        assert_eq!(config.approval.timeout, Duration::from_secs(3600));
    }
}
