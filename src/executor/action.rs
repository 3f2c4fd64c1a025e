//! Action-line parsing for executor output
//!
//! Reasoning output invokes a tool either as a bare JSON object
//! (`{"tool": "...", "args": {...}}`) or as a marker line
//! (`ACTION: tool_name {"arg": ...}`). A marker line that cannot be parsed
//! is a typed [`AgentError::MalformedAction`] so the loop can feed a
//! corrective observation back instead of guessing.

use crate::error::AgentError;
use crate::models::ACTION_PREFIX;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

lazy_static! {
    static ref ACTION_LINE_RE: Regex =
        Regex::new(r"(?m)^\s*ACTION:\s*([A-Za-z0-9_\-]+)\s*(.*)$").expect("action pattern is valid");
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub tool: String,
    pub args: Value,
}

/// Extract a tool invocation from a reasoning message.
///
/// Returns `Ok(None)` when the message carries no action marker at all,
/// meaning it is a final answer.
pub fn parse_action(message: &str) -> Result<Option<ActionInvocation>> {
    let trimmed = message.trim();

    // A message that is one whole JSON object with a "tool" key is treated
    // as an invocation even without the marker line.
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(tool) = map.get("tool").and_then(|v| v.as_str()) {
                let args = map.get("args").cloned().unwrap_or_else(|| json!({}));
                if !args.is_object() {
                    return Err(AgentError::MalformedAction(
                        "'args' must be a JSON object".to_string(),
                    ));
                }
                return Ok(Some(ActionInvocation {
                    tool: tool.to_string(),
                    args,
                }));
            }
        }
    }

    if !message.contains(ACTION_PREFIX) {
        return Ok(None);
    }

    let Some(captures) = ACTION_LINE_RE.captures(message) else {
        return Err(AgentError::MalformedAction(
            "action line carries no tool name".to_string(),
        ));
    };

    let tool = captures[1].to_string();
    let raw_args = captures
        .get(2)
        .map(|m| m.as_str().trim())
        .unwrap_or_default();

    let args = if raw_args.is_empty() {
        json!({})
    } else {
        match serde_json::from_str::<Value>(raw_args) {
            Ok(value) if value.is_object() => value,
            Ok(_) => {
                return Err(AgentError::MalformedAction(
                    "action arguments must be a JSON object".to_string(),
                ))
            }
            Err(e) => {
                return Err(AgentError::MalformedAction(format!(
                    "invalid action arguments: {}",
                    e
                )))
            }
        }
    };

    Ok(Some(ActionInvocation { tool, args }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_final_answer() {
        assert_eq!(parse_action("The file contains three entries.").unwrap(), None);
    }

    #[test]
    fn test_marker_line_parses() {
        let invocation = parse_action("Let me check.\nACTION: read_file {\"path\": \"a.md\"}")
            .unwrap()
            .unwrap();
        assert_eq!(invocation.tool, "read_file");
        assert_eq!(invocation.args["path"], "a.md");
    }

    #[test]
    fn test_marker_line_without_args_defaults_to_empty_object() {
        let invocation = parse_action("ACTION: list_directory").unwrap().unwrap();
        assert_eq!(invocation.tool, "list_directory");
        assert_eq!(invocation.args, json!({}));
    }

    #[test]
    fn test_bare_json_object_parses() {
        let invocation = parse_action(r#"{"tool": "search_notes", "args": {"query": "gym"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(invocation.tool, "search_notes");
        assert_eq!(invocation.args["query"], "gym");
    }

    #[test]
    fn test_malformed_args_are_typed_errors() {
        let err = parse_action("ACTION: read_file {not json").unwrap_err();
        assert!(matches!(err, AgentError::MalformedAction(_)));

        let err = parse_action("ACTION: read_file [1, 2]").unwrap_err();
        assert!(matches!(err, AgentError::MalformedAction(_)));
    }

    #[test]
    fn test_marker_without_tool_name_is_malformed() {
        let err = parse_action("ACTION: ").unwrap_err();
        assert!(matches!(err, AgentError::MalformedAction(_)));
    }
}
