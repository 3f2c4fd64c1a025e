use assistant_orchestrator::{
    approval::ProposalGate,
    channel::InMemoryChannel,
    config::AgentConfig,
    executor::ExecutorSet,
    llm::{GeminiClient, ReasoningClient},
    models::ChatTurn,
    planner::Planner,
    router::Router,
    tools::{create_default_registry, NoteVault},
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::info;

const CHAT_PERSONA: &str =
    "You are a helpful personal assistant. Be concise and direct.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();
    let config = AgentConfig::from_env();

    if config.llm.api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
    }

    info!("Assistant orchestrator starting");

    // Wire up the engine. The REPL uses the in-memory approval channel;
    // typed `approve <id>` replies are injected as channel events.
    let llm: Arc<dyn ReasoningClient> = Arc::new(GeminiClient::new(config.llm.clone()));
    let (channel, events) = InMemoryChannel::new();
    let channel = Arc::new(channel);
    let gate = Arc::new(ProposalGate::new(
        channel.clone(),
        config.approval.channel.clone(),
    ));
    let _listener = ProposalGate::spawn_listener(gate.clone(), events);

    let vault = Arc::new(NoteVault::new());
    let registry = Arc::new(create_default_registry(vault, gate.clone()));
    let executors = Arc::new(ExecutorSet::new(llm.clone(), registry));
    let planner = Arc::new(Planner::new(llm.clone(), executors.clone()));
    let router = Router::new(
        llm.clone(),
        planner,
        executors,
        gate.clone(),
        config.routing.clone(),
    );

    println!("Assistant ready. Type a request ('quit' to exit).");

    let stdin = std::io::stdin();
    let mut history: Vec<ChatTurn> = vec![ChatTurn::system(CHAT_PERSONA)];

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        // Approval replies go to the channel, where the gate listener
        // picks them up and runs the deferred action.
        let lowered = input.to_lowercase();
        if lowered.starts_with("approve ") || lowered.starts_with("reject ") {
            channel.receive(input, gate.destination());
            tokio::task::yield_now().await;
            println!("Reply forwarded to the approval channel.");
            continue;
        }

        match router.route(input).await {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {
                // Unrouted input falls back to open conversation.
                history.push(ChatTurn::user(input));
                match llm.converse(&history).await {
                    Ok(reply) => {
                        println!("{}", reply);
                        history.push(ChatTurn::assistant(reply));
                    }
                    Err(e) => eprintln!("Chat failed: {}", e),
                }
            }
            Err(e) => eprintln!("Routing failed: {}", e),
        }
    }

    info!("Assistant shutting down");
    Ok(())
}
