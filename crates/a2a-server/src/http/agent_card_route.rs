use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use a2a_protocol::agent_card::AgentCard;

/// GET /.well-known/agent.json
pub async fn agent_card_handler(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.agent_card.clone())
}
