pub mod agent_card_route;
pub mod health;
pub mod rpc;
