use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

mod agent_card;
mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "a2a_server=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("A2A_CONFIG_PATH").ok();
    let config = a2a_core::config::A2aConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        a2a_core::config::A2aConfig::default()
    });

    let storage = a2a_storage::factory::build_storage(&config.queue).await?;
    let manager = Arc::new(a2a_manager::TaskManager::new(
        storage.clone(),
        config.agent.max_conversation_history,
    ));

    let mut toolbox = a2a_toolbox::ToolBox::new();
    toolbox.add(Box::new(a2a_toolbox::InputRequiredTool));

    let artifact_root = std::env::var("A2A_ARTIFACT_ROOT").unwrap_or_else(|_| "data/artifacts".to_string());
    let artifact_service = Arc::new(a2a_artifacts::FsArtifactService::new(artifact_root));
    if config.toolbox.enable_create_artifact {
        toolbox.add(Box::new(a2a_toolbox::CreateArtifactTool::new(artifact_service.clone())));
    }

    let api_key = config.agent.api_key.clone().unwrap_or_default();
    let client: Arc<dyn a2a_agent::LlmClient> = Arc::new(a2a_agent::OpenAiClient::new(
        config.agent.provider.clone(),
        api_key,
        config.agent.base_url.clone(),
    ));

    let mut agent_loop = a2a_agent::AgentLoop::new(client, Arc::new(toolbox), config.agent.model.clone())
        .with_max_iterations(config.agent.max_chat_completion_iterations);
    if let Some(prompt) = &config.agent.system_prompt {
        agent_loop = agent_loop.with_system_prompt(prompt.clone());
    }
    let agent_loop = Arc::new(agent_loop);

    let agent_card_path = std::env::var("A2A_AGENT_CARD_PATH").ok();
    let card = agent_card::load(agent_card_path.as_deref(), &config.server);

    let shutdown = CancellationToken::new();

    let processor = Arc::new(a2a_queue::Processor::new(
        storage.clone(),
        manager.clone(),
        agent_loop.clone(),
        Duration::from_secs(config.queue.cleanup_interval_secs),
    ));
    let processor_handle = tokio::spawn(processor.run(shutdown.clone()));

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = Arc::new(app::AppState {
        config,
        manager,
        storage: storage.clone(),
        agent: agent_loop,
        agent_card: card,
        shutdown: shutdown.clone(),
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("a2a-server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    processor_handle.await?;
    storage.close().await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("shutdown signal received");
    shutdown.cancel();
}
