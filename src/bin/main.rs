use finance_chat_agent::{
    dispatcher::Dispatcher,
    llm::GeminiClient,
    models::InboundMessage,
    outbound::ConsoleGateway,
    store::InMemoryLedgerStore,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    dotenv::dotenv().ok();

    info!("Finance chat agent - offline demo");

    // Without an API key the completion-API fallbacks degrade gracefully;
    // everything pattern-matched below still works end to end.
    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();

    let store = Arc::new(InMemoryLedgerStore::new());
    let llm = Arc::new(GeminiClient::new(api_key));
    let gateway = Arc::new(ConsoleGateway);

    let dispatcher = Dispatcher::new(store, llm, gateway);

    let messages = [
        "minhas categorias",
        "50 uber",
        "orçamento transporte 300",
        "verificar orçamento transporte",
        "meus orçamentos",
        "excluir orçamento transporte",
    ];

    for (index, text) in messages.iter().enumerate() {
        println!("← {}", text);
        dispatcher
            .handle_inbound_message(InboundMessage {
                sender_id: "5511999990000".to_string(),
                text: text.to_string(),
                message_id: format!("demo-{}", index + 1),
            })
            .await;
    }

    Ok(())
}
