//! Server-sent-event framing for `message/stream`.
//!
//! Wire: a sequence of `data: <json>\n\n` lines, terminated by
//! `data: [DONE]\n\n`.

use serde::Serialize;

/// Format one SSE data frame for an arbitrary serializable event payload.
pub fn frame(event: &impl Serialize) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "null".to_string());
    format!("data: {json}\n\n")
}

/// The terminal `[DONE]` frame that closes an SSE stream.
pub fn done_frame() -> &'static str {
    "data: [DONE]\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_wraps_json_with_sse_prefix_and_blank_line() {
        let out = frame(&serde_json::json!({"a": 1}));
        assert_eq!(out, "data: {\"a\":1}\n\n");
    }

    #[test]
    fn done_frame_is_literal() {
        assert_eq!(done_frame(), "data: [DONE]\n\n");
    }
}
