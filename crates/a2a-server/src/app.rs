//! Central shared state (`AppState`) and router assembly (`build_router`)
//! for the single A2A JSON-RPC POST surface.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;

use a2a_core::config::A2aConfig;
use a2a_agent::AgentLoop;
use a2a_manager::TaskManager;
use a2a_protocol::agent_card::AgentCard;
use a2a_storage::Storage;

pub struct AppState {
    pub config: A2aConfig,
    pub manager: Arc<TaskManager>,
    pub storage: Arc<dyn Storage>,
    pub agent: Arc<AgentLoop>,
    pub agent_card: AgentCard,
    /// Canceling this tears down the processor and cleanup ticker; a fresh
    /// one is not created per request, only once at startup.
    pub shutdown: CancellationToken,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(crate::http::rpc::rpc_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/.well-known/agent.json",
            get(crate::http::agent_card_route::agent_card_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use a2a_agent::client::{ChatCompletionResponse, ChatChoice, LlmClient, BackendMessage, BackendRole, ProviderError};
    use a2a_agent::AgentLoop;
    use a2a_core::config::A2aConfig;
    use a2a_manager::TaskManager;
    use a2a_protocol::agent_card::AgentCard;
    use a2a_storage::in_memory::InMemoryStorage;
    use a2a_toolbox::ToolBox;

    /// Answers every chat-completion call with a fixed assistant reply, no tool calls.
    struct StubClient;

    #[async_trait]
    impl LlmClient for StubClient {
        fn name(&self) -> &str {
            "stub"
        }

        async fn create_chat_completion(
            &self,
            _req: &a2a_agent::client::ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, ProviderError> {
            Ok(ChatCompletionResponse {
                choices: vec![ChatChoice {
                    message: BackendMessage::new(BackendRole::Assistant, "hello there"),
                    finish_reason: Some("stop".to_string()),
                }],
            })
        }
    }

    fn test_state() -> Arc<AppState> {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = Arc::new(TaskManager::new(storage.clone(), 50));
        let agent = Arc::new(AgentLoop::new(Arc::new(StubClient), Arc::new(ToolBox::new()), "stub-model"));
        Arc::new(AppState {
            config: A2aConfig::default(),
            manager,
            storage,
            agent,
            agent_card: AgentCard::new("test-agent", "0.0.1", "http://localhost:8089"),
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn health_reports_an_empty_queue() {
        let router = build_router(test_state());
        let resp = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn agent_card_route_serves_the_configured_card() {
        let router = build_router(test_state());
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_rpc_method_returns_method_not_found() {
        let router = build_router(test_state());
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "nonexistent/method"});
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], a2a_protocol::jsonrpc::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn message_send_creates_and_enqueues_a_task() {
        let router = build_router(test_state());
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": {"message": {"role": "user", "parts": [{"kind": "text", "text": "hi"}]}}
        });
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["result"]["id"].is_string());
    }
}
