use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use chat_api_server::config::Settings;
use chat_api_server::logging::init_tracing;
use chat_api_server::security::ApiKeyValidator;
use chat_api_server::services::{
    ChatOrchestrator, EmbeddingService, EventBus, EvictionSweeper, KnowledgeBase, LlmService,
    SessionManager,
};
use chat_api_server::services::knowledge::VectorIndex;
use chat_api_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let _log_guard = init_tracing(&settings.logging)?;

    info!("Starting chat API server");

    // Long-term memory
    let embedder = Arc::new(EmbeddingService::new(&settings.knowledge)?);
    let knowledge = match KnowledgeBase::build(&settings.knowledge, embedder.clone()).await {
        Ok(kb) => kb,
        Err(e) => {
            error!("Knowledge base unavailable, continuing without long-term memory: {:#}", e);
            KnowledgeBase::new(VectorIndex::default(), embedder, settings.knowledge.context_size)
        }
    };

    // Session lifecycle
    let event_bus = Arc::new(EventBus::default());
    let sessions = Arc::new(SessionManager::new(&settings.session, event_bus.clone()));

    let llm = LlmService::new(settings.llm.clone(), &settings.prompts)?;
    if settings.llm.api_key.is_none() {
        warn!("No LLM API key configured");
    }
    let orchestrator = Arc::new(ChatOrchestrator::new(
        sessions.clone(),
        Arc::new(knowledge),
        Arc::new(llm),
        settings.llm.chain_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = EvictionSweeper::new(sessions.clone(), settings.session.sweep_period())
        .spawn(shutdown_rx);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        api_keys: Arc::new(ApiKeyValidator::new(settings.security.api_key.clone())),
        settings: Arc::new(settings),
        sessions,
        orchestrator,
        event_bus,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down sweeper");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
