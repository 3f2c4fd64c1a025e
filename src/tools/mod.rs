//! Tool trait and registry
//!
//! Tools are the only way executors touch the outside world. The registry
//! dispatches by name and surfaces unknown names as a typed error so the
//! executor loop can feed a corrective observation back to the model.
//!
//! Destructive tools are not registered directly. They are wrapped in
//! [`GatedTool`], which swaps execution for a published [`Proposal`] and a
//! pause-marker result.

use crate::approval::ProposalGate;
use crate::error::AgentError;
use crate::models::{Proposal, ToolResult, PAUSE_MARKER};
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// JSON arguments handed to a tool by the executor.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    pub parameters: Value,
}

impl ToolArgs {
    pub fn new(parameters: Value) -> Self {
        Self { parameters }
    }

    /// Required string field; absence is an input error, not a panic.
    pub fn require_str(&self, field: &str) -> Result<&str> {
        self.parameters
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidToolInput(format!("Expected '{}' in tool arguments", field))
            })
    }

}

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Dispatch by name. Unknown names are a typed [`AgentError::ToolNotFound`]
    /// so callers can self-correct instead of crashing.
    pub async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        debug!(tool = name, "Executing tool");
        tool.execute(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory note vault backing the file tools. A stand-in for the real
/// filesystem vault so the engine runs without touching disk.
pub struct NoteVault {
    files: Mutex<HashMap<String, String>>,
}

impl NoteVault {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "daily_log.md".to_string(),
            "# Daily Log\n\n- Reviewed open positions\n- Drafted quarterly summary\n".to_string(),
        );
        files.insert(
            "projects/orchestrator.md".to_string(),
            "# Orchestrator\n\nRouting engine notes and follow-ups.\n".to_string(),
        );
        Self {
            files: Mutex::new(files),
        }
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn write(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn list(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn search(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        let files = self.files.lock().unwrap();
        let mut hits: Vec<(String, String)> = files
            .iter()
            .filter(|(path, content)| {
                path.to_lowercase().contains(&needle) || content.to_lowercase().contains(&needle)
            })
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits
    }
}

impl Default for NoteVault {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReadFileTool {
    vault: Arc<NoteVault>,
}

impl ReadFileTool {
    pub fn new(vault: Arc<NoteVault>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file from the note vault"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let path = args.require_str("path")?;
        match self.vault.read(path) {
            Some(content) => Ok(ToolResult::ok(json!(content))),
            None => Ok(ToolResult::err(format!("file not found: {}", path))),
        }
    }
}

pub struct ListDirectoryTool {
    vault: Arc<NoteVault>,
}

impl ListDirectoryTool {
    pub fn new(vault: Arc<NoteVault>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List all files in the note vault"
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<ToolResult> {
        Ok(ToolResult::ok(json!(self.vault.list())))
    }
}

pub struct SearchNotesTool {
    vault: Arc<NoteVault>,
}

impl SearchNotesTool {
    pub fn new(vault: Arc<NoteVault>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &'static str {
        "search_notes"
    }

    fn description(&self) -> &'static str {
        "Search the note vault for files matching a query"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let query = args.require_str("query")?;
        let hits = self.vault.search(query);

        if hits.is_empty() {
            return Ok(ToolResult::ok(json!(format!(
                "No notes matched '{}'",
                query
            ))));
        }

        let listing: Vec<Value> = hits
            .into_iter()
            .map(|(path, content)| json!({ "path": path, "content": content }))
            .collect();
        Ok(ToolResult::ok(json!(listing)))
    }
}

pub struct WriteFileTool {
    vault: Arc<NoteVault>,
}

impl WriteFileTool {
    pub fn new(vault: Arc<NoteVault>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file in the note vault (destructive)"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let path = args.require_str("path")?;
        let content = args.require_str("content")?;
        self.vault.write(path, content);
        info!(path = %path, "File written to vault");
        Ok(ToolResult::ok(json!(format!("wrote {}", path))))
    }
}

/// Wraps a destructive tool behind the approval gate.
///
/// `execute` never runs the inner tool. It files a proposal, registers a
/// callback that performs the real write once approved, publishes, and
/// returns a pause-marker result. A failed publish denies the action.
pub struct GatedTool {
    inner: Arc<dyn Tool>,
    gate: Arc<ProposalGate>,
}

impl GatedTool {
    pub fn new(inner: Arc<dyn Tool>, gate: Arc<ProposalGate>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait::async_trait]
impl Tool for GatedTool {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let mut parameters = HashMap::new();
        parameters.insert("arguments".to_string(), args.parameters.clone());

        let proposal = self.gate.create(
            format!("{} {}", self.inner.name(), args.parameters),
            "Requested by an executor during plan execution".to_string(),
            "Destructive operation, modifies stored content".to_string(),
            parameters,
        );

        let inner = self.inner.clone();
        let deferred_args = args.clone();
        self.gate.register_callback(
            &proposal.id,
            Box::new(move |p: Proposal| {
                let inner = inner.clone();
                let args = deferred_args.clone();
                Box::pin(async move {
                    let result = inner.execute(&args).await?;
                    info!(
                        id = %p.id,
                        success = result.success,
                        "Deferred action executed after approval"
                    );
                    Ok(())
                })
            }),
        );

        let published = self.gate.publish(&proposal).await?;
        if !published {
            return Ok(ToolResult::err(
                "approval channel unavailable, action denied",
            ));
        }

        Ok(ToolResult::ok(json!(format!(
            "{}. Proposal [{}] sent for approval.",
            PAUSE_MARKER, proposal.id
        ))))
    }
}

/// Create the default registry: vault readers plus the gated writer.
pub fn create_default_registry(vault: Arc<NoteVault>, gate: Arc<ProposalGate>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ReadFileTool::new(vault.clone())));
    registry.register(Arc::new(ListDirectoryTool::new(vault.clone())));
    registry.register(Arc::new(SearchNotesTool::new(vault.clone())));
    registry.register(Arc::new(GatedTool::new(
        Arc::new(WriteFileTool::new(vault)),
        gate,
    )));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;
    use std::time::Duration;

    fn test_gate() -> Arc<ProposalGate> {
        let (channel, _rx) = InMemoryChannel::new();
        Arc::new(ProposalGate::new(Arc::new(channel), "approvals"))
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_is_typed_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", &ToolArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_read_file_hits_and_misses() {
        let vault = Arc::new(NoteVault::new());
        let tool = ReadFileTool::new(vault);

        let hit = tool
            .execute(&ToolArgs::new(json!({"path": "daily_log.md"})))
            .await
            .unwrap();
        assert!(hit.success);
        assert!(hit.render().contains("Daily Log"));

        let miss = tool
            .execute(&ToolArgs::new(json!({"path": "missing.md"})))
            .await
            .unwrap();
        assert!(!miss.success);
        assert!(miss.render().contains("file not found"));
    }

    #[tokio::test]
    async fn test_search_notes_matches_content() {
        let vault = Arc::new(NoteVault::new());
        let tool = SearchNotesTool::new(vault);

        let result = tool
            .execute(&ToolArgs::new(json!({"query": "routing"})))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.render().contains("projects/orchestrator.md"));
    }

    #[tokio::test]
    async fn test_missing_argument_is_input_error() {
        let vault = Arc::new(NoteVault::new());
        let tool = ReadFileTool::new(vault);
        let err = tool.execute(&ToolArgs::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolInput(_)));
    }

    #[tokio::test]
    async fn test_gated_tool_pauses_instead_of_writing() {
        let vault = Arc::new(NoteVault::new());
        let gate = test_gate();
        let gated = GatedTool::new(Arc::new(WriteFileTool::new(vault.clone())), gate);

        let result = gated
            .execute(&ToolArgs::new(
                json!({"path": "new.md", "content": "draft"}),
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.render().contains(PAUSE_MARKER));
        assert!(vault.read("new.md").is_none());
    }

    #[tokio::test]
    async fn test_gated_tool_writes_after_approval() {
        let vault = Arc::new(NoteVault::new());
        let gate = test_gate();
        let gated = GatedTool::new(Arc::new(WriteFileTool::new(vault.clone())), gate.clone());

        let result = gated
            .execute(&ToolArgs::new(
                json!({"path": "new.md", "content": "draft"}),
            ))
            .await
            .unwrap();

        // Pull the id back out of the pause message.
        let rendered = result.render();
        let id = rendered
            .split('[')
            .nth(1)
            .and_then(|s| s.split(']').next())
            .unwrap()
            .to_string();

        let approved = gate
            .observe(&format!("approve {}", id), "approvals")
            .unwrap();
        assert!(gate.await_approval(&approved, Duration::from_secs(1)).await);
        assert!(gate.execute_approved(&approved).await);
        assert_eq!(vault.read("new.md").as_deref(), Some("draft"));
    }
}
