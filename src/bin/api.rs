use assistant_orchestrator::{
    api::{start_server, ApiState},
    approval::ProposalGate,
    channel::{ApprovalChannel, InMemoryChannel, RestChannel},
    config::AgentConfig,
    executor::ExecutorSet,
    llm::{GeminiClient, ReasoningClient},
    planner::Planner,
    router::Router,
    tools::{create_default_registry, NoteVault},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();
    let config = AgentConfig::from_env();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Assistant Orchestrator - API server");
    info!("Port: {}", api_port);

    let llm: Arc<dyn ReasoningClient> = Arc::new(GeminiClient::new(config.llm.clone()));

    // Prefer the chat-server channel when configured; otherwise fall back to
    // the in-memory channel with a local listener so gated actions still
    // pause instead of failing. Replies on the REST channel are delivered by
    // the chat-side integration, not observed by this process.
    let (gate, listener) = if config.approval.server_url.is_empty() {
        info!("Approval server not configured, using in-memory channel");
        let (channel, events) = InMemoryChannel::new();
        let gate = Arc::new(ProposalGate::new(
            Arc::new(channel),
            config.approval.channel.clone(),
        ));
        let listener = ProposalGate::spawn_listener(gate.clone(), events);
        (gate, Some(listener))
    } else {
        let channel: Arc<dyn ApprovalChannel> = Arc::new(RestChannel::new(&config.approval)?);
        let gate = Arc::new(ProposalGate::new(
            channel,
            config.approval.channel.clone(),
        ));
        (gate, None)
    };

    let vault = Arc::new(NoteVault::new());
    let registry = Arc::new(create_default_registry(vault, gate.clone()));
    let executors = Arc::new(ExecutorSet::new(llm.clone(), registry));
    let planner = Arc::new(Planner::new(llm.clone(), executors.clone()));
    let router = Arc::new(Router::new(
        llm,
        planner.clone(),
        executors,
        gate,
        config.routing.clone(),
    ));

    info!("Engine initialized, starting API server");

    start_server(ApiState { router, planner }, api_port).await?;

    if let Some(handle) = listener {
        handle.abort();
    }

    Ok(())
}
