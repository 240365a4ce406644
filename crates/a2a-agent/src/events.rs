//! Events emitted by the streaming agent loop (`run_with_stream`). The
//! JSON-RPC dispatcher (external to this crate) consumes these and
//! reassembles a consolidated message before archiving.

use a2a_core::types::Message;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    RunStarted,
    IterationStarted { iteration: usize },
    /// A chunked fragment of the assistant's in-progress reply.
    /// `message.message_id` is synthesized as `chunk-<seq>`.
    MessageDelta { message: Message },
    ToolCall {
        name: String,
        id: String,
        input: serde_json::Value,
    },
    ToolResult {
        name: String,
        id: String,
        output: String,
        is_error: bool,
    },
    /// Terminal: the agent is pausing for user input.
    InputRequired { message: Message },
    /// Terminal success.
    RunCompleted { message: Message },
    /// Terminal failure.
    RunFailed { error: String },
}

impl AgentEvent {
    /// Event name as it appears on the wire (`agent.run.started`, etc.) —
    /// used by the SSE dispatcher when framing events.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::RunStarted => "agent.run.started",
            AgentEvent::IterationStarted { .. } => "agent.iteration.started",
            AgentEvent::MessageDelta { .. } => "agent.message.delta",
            AgentEvent::ToolCall { .. } => "agent.tool.call",
            AgentEvent::ToolResult { .. } => "agent.tool.result",
            AgentEvent::InputRequired { .. } => "agent.input.required",
            AgentEvent::RunCompleted { .. } => "agent.run.completed",
            AgentEvent::RunFailed { .. } => "agent.run.failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::InputRequired { .. } | AgentEvent::RunCompleted { .. } | AgentEvent::RunFailed { .. }
        )
    }
}

/// Prefix used for the synthetic message ids of chunked assistant deltas.
pub const CHUNK_PREFIX: &str = "chunk-";

pub fn chunk_message_id(seq: u64) -> String {
    format!("{CHUNK_PREFIX}{seq}")
}

/// Reassemble a sequence of emitted events into one consolidated message plus
/// the terminal outcome:
///
/// if any non-chunk assistant `message` kind event won, that message wins;
/// otherwise concatenate chunk text in emit order and synthesize one message
/// with id `assistant-<last-chunk-number>`.
pub struct Consolidated {
    pub message: Message,
    pub input_required: bool,
}

pub fn consolidate(events: &[AgentEvent]) -> Option<Consolidated> {
    for event in events {
        match event {
            AgentEvent::RunCompleted { message } => {
                return Some(Consolidated {
                    message: message.clone(),
                    input_required: false,
                });
            }
            AgentEvent::InputRequired { message } => {
                return Some(Consolidated {
                    message: message.clone(),
                    input_required: true,
                });
            }
            _ => {}
        }
    }

    // No terminal non-chunk message — fall back to concatenating chunk text.
    let mut text = String::new();
    let mut last_chunk_number: Option<u64> = None;
    for event in events {
        if let AgentEvent::MessageDelta { message } = event {
            text.push_str(&message.text_content());
            if let Some(n) = message.message_id.strip_prefix(CHUNK_PREFIX) {
                if let Ok(n) = n.parse::<u64>() {
                    last_chunk_number = Some(n);
                }
            }
        }
    }

    last_chunk_number.map(|n| Consolidated {
        message: Message {
            kind: a2a_core::types::MessageKind::Message,
            message_id: format!("assistant-{n}"),
            role: a2a_core::types::Role::Assistant,
            context_id: None,
            parts: vec![a2a_core::types::Part::text(text)],
        },
        input_required: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_core::types::{MessageKind, Part, Role};

    fn chunk(seq: u64, text: &str) -> AgentEvent {
        AgentEvent::MessageDelta {
            message: Message {
                kind: MessageKind::Message,
                message_id: chunk_message_id(seq),
                role: Role::Assistant,
                context_id: None,
                parts: vec![Part::text(text)],
            },
        }
    }

    #[test]
    fn concatenates_chunk_text_in_emit_order_when_no_final_message() {
        let events = vec![AgentEvent::RunStarted, chunk(0, "hel"), chunk(1, "lo")];
        let consolidated = consolidate(&events).unwrap();
        assert_eq!(consolidated.message.text_content(), "hello");
        assert_eq!(consolidated.message.message_id, "assistant-1");
        assert!(!consolidated.input_required);
    }

    #[test]
    fn non_chunk_final_message_wins_over_chunks() {
        let events = vec![
            chunk(0, "partial"),
            AgentEvent::RunCompleted {
                message: Message::assistant_text("final answer"),
            },
        ];
        let consolidated = consolidate(&events).unwrap();
        assert_eq!(consolidated.message.text_content(), "final answer");
    }

    #[test]
    fn input_required_event_sets_the_flag() {
        let events = vec![AgentEvent::InputRequired {
            message: Message::assistant_text("which city?"),
        }];
        let consolidated = consolidate(&events).unwrap();
        assert!(consolidated.input_required);
    }
}
