//! Wire-format compatibility checks — these pin the exact JSON shapes
//! clients depend on. Breaking one of these is a breaking wire change.

use a2a_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use a2a_protocol::sse;
use serde_json::json;

#[test]
fn request_envelope_accepts_string_and_numeric_ids() {
    let numeric = r#"{"jsonrpc":"2.0","id":1,"method":"message/send","params":{}}"#;
    let stringy = r#"{"jsonrpc":"2.0","id":"req-1","method":"message/send","params":{}}"#;

    let a: JsonRpcRequest = serde_json::from_str(numeric).unwrap();
    let b: JsonRpcRequest = serde_json::from_str(stringy).unwrap();

    assert_eq!(a.method, "message/send");
    assert_eq!(b.method, "message/send");
}

#[test]
fn success_response_omits_error_field() {
    let resp = JsonRpcResponse::ok(json!(1), json!({"id": "task-1"}));
    let v = serde_json::to_value(&resp).unwrap();
    assert!(v.get("error").is_none());
    assert!(v.get("result").is_some());
}

#[test]
fn sse_stream_terminates_with_done_sentinel() {
    let frames: Vec<String> = vec![
        sse::frame(&json!({"event": "agent.run.started"})),
        sse::done_frame().to_string(),
    ];
    assert!(frames.last().unwrap().ends_with("[DONE]\n\n"));
}
