//! Wire-protocol types for the A2A JSON-RPC surface: request/response
//! envelopes, well-known method names, SSE framing, and the agent card.
//!
//! The HTTP transport itself (routing, auth middleware) is external to this
//! crate — it only defines the shapes that cross the wire.

pub mod agent_card;
pub mod jsonrpc;
pub mod methods;
pub mod params;
pub mod sse;
