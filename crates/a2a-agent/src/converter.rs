//! Protocol message ↔ backend chat-completion message conversion.
//! Preserves tool-call and tool-result semantics across the
//! boundary: a `data` part on an assistant message carries `tool_call(s)`;
//! a `data` part on a tool message carries `{tool_call_id, result}`.

use serde_json::{json, Map, Value};

use a2a_core::types::{Message, MessageKind, Part, Role};

use crate::client::{BackendFunctionCall, BackendMessage, BackendRole, BackendToolCall};

fn to_backend_role(role: Role) -> BackendRole {
    match role {
        Role::User => BackendRole::User,
        Role::Assistant => BackendRole::Assistant,
        Role::System => BackendRole::System,
        Role::Tool => BackendRole::Tool,
    }
}

fn from_backend_role(role: BackendRole) -> Role {
    match role {
        BackendRole::User => Role::User,
        BackendRole::Assistant => Role::Assistant,
        BackendRole::System => Role::System,
        BackendRole::Tool => Role::Tool,
    }
}

/// Convert one protocol message into backend chat-completion form.
pub fn to_backend(message: &Message) -> BackendMessage {
    let content = message.text_content();
    let mut backend = BackendMessage::new(to_backend_role(message.role), content);

    for part in &message.parts {
        let Part::Data { data } = part else { continue };

        if message.role == Role::Tool {
            if let Some(id) = data.get("tool_call_id").and_then(Value::as_str) {
                backend.tool_call_id = Some(id.to_string());
            }
            if let Some(name) = data.get("tool_name").and_then(Value::as_str) {
                backend.tool_name = Some(name.to_string());
            }
            if let Some(result) = data.get("result").and_then(Value::as_str) {
                if !backend.content.is_empty() {
                    backend.content.push('\n');
                }
                backend.content.push_str(result);
            }
        }

        if message.role == Role::Assistant {
            if let Some(calls) = data.get("tool_calls").and_then(Value::as_array) {
                backend.tool_calls = Some(calls.iter().filter_map(parse_tool_call_value).collect());
            } else if let Some(call) = data.get("tool_call") {
                if let Some(parsed) = parse_tool_call_value(call) {
                    backend.tool_calls = Some(vec![parsed]);
                }
            }
        }
    }

    backend
}

fn parse_tool_call_value(value: &Value) -> Option<BackendToolCall> {
    let id = value.get("id")?.as_str()?.to_string();
    let function = value.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = function
        .get("arguments")
        .map(|a| match a {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "{}".to_string());

    Some(BackendToolCall {
        id,
        kind: "function".to_string(),
        function: BackendFunctionCall { name, arguments },
    })
}

/// Convert a backend chat-completion message back into protocol form.
/// Always emits at least one part.
pub fn from_backend(backend: &BackendMessage) -> Message {
    let role = from_backend_role(backend.role);
    let mut parts = Vec::new();

    match role {
        Role::Tool => {
            let mut map = Map::new();
            if let Some(id) = &backend.tool_call_id {
                map.insert("tool_call_id".to_string(), json!(id));
            }
            if let Some(name) = &backend.tool_name {
                map.insert("tool_name".to_string(), json!(name));
            }
            map.insert("result".to_string(), json!(backend.content));
            parts.push(Part::Data { data: map });
        }
        Role::Assistant => {
            if !backend.content.is_empty() {
                parts.push(Part::text(backend.content.clone()));
            }
            if let Some(tool_calls) = &backend.tool_calls {
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": tc.kind,
                                "function": {
                                    "name": tc.function.name,
                                    "arguments": tc.function.arguments,
                                }
                            })
                        })
                        .collect();
                    let mut map = Map::new();
                    map.insert("tool_calls".to_string(), json!(calls));
                    parts.push(Part::Data { data: map });
                }
            }
            if let Some(reasoning) = &backend.reasoning {
                if !reasoning.is_empty() {
                    parts.push(Part::text(reasoning.clone()));
                }
            }
        }
        _ => {
            parts.push(Part::text(backend.content.clone()));
        }
    }

    if parts.is_empty() {
        parts.push(Part::text(""));
    }

    Message {
        kind: MessageKind::Message,
        message_id: uuid::Uuid::new_v4().to_string(),
        role,
        context_id: None,
        parts,
    }
}

/// Build a synthetic `tool`-role message carrying a tool's result back into
/// history, tagged with the originating `tool_call_id`.
pub fn tool_result_message(tool_call_id: &str, tool_name: &str, result: &str) -> Message {
    let mut map = Map::new();
    map.insert("tool_call_id".to_string(), json!(tool_call_id));
    map.insert("tool_name".to_string(), json!(tool_name));
    map.insert("result".to_string(), json!(result));

    Message {
        kind: MessageKind::Message,
        message_id: uuid::Uuid::new_v4().to_string(),
        role: Role::Tool,
        context_id: None,
        parts: vec![Part::Data { data: map }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_role_and_text() {
        let msg = Message::user_text("hello world");
        let backend = to_backend(&msg);
        assert_eq!(backend.content, "hello world");
        let back = from_backend(&backend);
        assert_eq!(back.role, Role::User);
        assert_eq!(back.text_content(), "hello world");
    }

    #[test]
    fn tool_message_carries_tool_call_id_into_backend() {
        let msg = tool_result_message("call_1", "search", "3 results");
        let backend = to_backend(&msg);
        assert_eq!(backend.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(backend.tool_name.as_deref(), Some("search"));
        assert!(backend.content.contains("3 results"));
    }

    #[test]
    fn tool_name_survives_backend_to_protocol_round_trip() {
        let backend = BackendMessage {
            role: BackendRole::Tool,
            content: "3 results".to_string(),
            tool_call_id: Some("call_1".to_string()),
            tool_name: Some("search".to_string()),
            tool_calls: None,
            reasoning: None,
        };
        let msg = from_backend(&backend);
        let Part::Data { data } = &msg.parts[0] else {
            panic!("expected a data part");
        };
        assert_eq!(data.get("tool_name").and_then(Value::as_str), Some("search"));

        let re_backend = to_backend(&msg);
        assert_eq!(re_backend.tool_name.as_deref(), Some("search"));
    }

    #[test]
    fn assistant_tool_calls_survive_round_trip() {
        let backend = BackendMessage {
            role: BackendRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Some(vec![BackendToolCall {
                id: "call_1".into(),
                kind: "function".into(),
                function: BackendFunctionCall {
                    name: "search".into(),
                    arguments: r#"{"q":"x"}"#.into(),
                },
            }]),
            reasoning: None,
        };
        let msg = from_backend(&backend);
        let re_backend = to_backend(&msg);
        assert_eq!(re_backend.tool_calls.unwrap()[0].function.name, "search");
    }

    #[test]
    fn unknown_role_maps_to_user() {
        assert_eq!(Role::from_str_lossy("moderator"), Role::User);
    }

    #[test]
    fn empty_message_always_emits_one_part() {
        let backend = BackendMessage::new(BackendRole::Assistant, "");
        let msg = from_backend(&backend);
        assert_eq!(msg.parts.len(), 1);
    }

    #[test]
    fn reasoning_text_becomes_a_further_text_part() {
        let mut backend = BackendMessage::new(BackendRole::Assistant, "the answer is 4");
        backend.reasoning = Some("2 + 2 = 4".to_string());
        let msg = from_backend(&backend);

        assert_eq!(msg.parts.len(), 2);
        let Part::Text { text: first } = &msg.parts[0] else {
            panic!("expected a text part");
        };
        let Part::Text { text: second } = &msg.parts[1] else {
            panic!("expected a text part");
        };
        assert_eq!(first, "the answer is 4");
        assert_eq!(second, "2 + 2 = 4");
    }
}
