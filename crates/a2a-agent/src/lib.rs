//! The agent execution loop: polling and streaming chat-completion
//! iterations with tool dispatch, the protocol ↔ backend
//! message converter (§4.5), and the chat-completion client boundary.

pub mod accumulator;
pub mod agent_loop;
pub mod client;
pub mod converter;
pub mod events;

pub use agent_loop::{AgentLoop, AgentOutcome, DEFAULT_MAX_ITERATIONS};
pub use client::{ChatCompletionRequest, ChatCompletionResponse, LlmClient, OpenAiClient, ProviderError};
pub use events::AgentEvent;
