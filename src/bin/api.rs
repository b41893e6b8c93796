use finance_chat_agent::{
    api::start_server,
    dispatcher::Dispatcher,
    llm::GeminiClient,
    outbound::{ConsoleGateway, HttpMessageGateway, MessageGateway},
    store::InMemoryLedgerStore,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        warn!("GEMINI_API_KEY not set; completion-API features will degrade to fallbacks");
        String::new()
    });

    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Finance Chat Agent - Webhook Server");
    info!("Port: {}", port);

    // Explicitly constructed service handles, injected into the dispatcher.
    // Lifecycle is owned here, by the process entry point.
    let store = Arc::new(InMemoryLedgerStore::new());
    let llm = Arc::new(GeminiClient::new(api_key));

    let gateway: Arc<dyn MessageGateway> = match (
        std::env::var("GATEWAY_BASE_URL"),
        std::env::var("GATEWAY_TOKEN"),
    ) {
        (Ok(base_url), Ok(token)) => {
            let sender_name =
                std::env::var("GATEWAY_SENDER_NAME").unwrap_or_else(|_| "Assistente".to_string());
            Arc::new(HttpMessageGateway::new(base_url, token).with_sender_name(sender_name))
        }
        _ => {
            warn!("GATEWAY_BASE_URL / GATEWAY_TOKEN not set; replies go to stdout");
            Arc::new(ConsoleGateway)
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(store, llm, gateway));

    info!("Dispatcher initialized");
    info!("Starting API server...");

    start_server(dispatcher, port).await?;

    Ok(())
}
