//! Agent card loading: a JSON file on disk, with a handful of
//! fields overridable so the same file can serve multiple deployments.

use a2a_core::config::ServerConfig;
use a2a_protocol::agent_card::AgentCard;
use tracing::{info, warn};

const DEFAULT_CARD_PATH: &str = "agent-card.json";

/// Load the agent card from `path` (falling back to [`DEFAULT_CARD_PATH`],
/// then to a bare-minimum generated card if neither exists), then apply the
/// `url` override derived from the server's bind/port when the card doesn't
/// declare one of its own.
pub fn load(path: Option<&str>, server: &ServerConfig) -> AgentCard {
    let path = path.unwrap_or(DEFAULT_CARD_PATH);

    let mut card = match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AgentCard>(&raw) {
            Ok(card) => {
                info!(path, "loaded agent card");
                card
            }
            Err(e) => {
                warn!(path, error = %e, "agent card file is malformed, using defaults");
                default_card()
            }
        },
        Err(_) => {
            warn!(path, "agent card file not found, using defaults");
            default_card()
        }
    };

    if card.url.is_empty() {
        card.url = format!("http://{}:{}", server.bind, server.port);
    }

    card
}

fn default_card() -> AgentCard {
    AgentCard::new("a2a-agent", env!("CARGO_PKG_VERSION"), "")
}
