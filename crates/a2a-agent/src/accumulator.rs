//! Tool-call delta accumulator for streaming chat completions.
//!
//! Grounded on the index-keyed tool-call assembly used by OpenAI-compatible
//! streaming parsers: deltas for a given tool call arrive split across
//! several chunks, keyed by an integer `index`; this type folds them into a
//! stable [`AccumulatedToolCall`] per index.

use std::collections::BTreeMap;

use crate::client::StreamToolCallDelta;

#[derive(Debug, Clone, Default)]
struct Entry {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates streamed tool-call deltas keyed by `index`. `BTreeMap` keeps
/// iteration in index order for free, matching "the final tool-call list is
/// the entries ordered by index" (§4.4).
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<usize, Entry>,
}

/// One fully (or partially) assembled tool call, read out of the
/// accumulator in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the accumulator.
    ///
    /// - A new index creates a fresh entry.
    /// - A present `id` overwrites the accumulator's id.
    /// - A present function `name` overwrites the accumulator's name.
    /// - Present `arguments` append to the accumulator's arguments buffer,
    ///   *unless* the buffer already parses as complete JSON — a guard
    ///   against providers that re-send the whole argument string instead
    ///   of an incremental fragment (§4.4, §9 open question).
    pub fn feed(&mut self, delta: &StreamToolCallDelta) {
        let entry = self.entries.entry(delta.index).or_default();

        if let Some(id) = &delta.id {
            entry.id = id.clone();
        }
        if let Some(name) = &delta.name {
            entry.name = name.clone();
        }
        if let Some(arguments) = &delta.arguments {
            if serde_json::from_str::<serde_json::Value>(&entry.arguments).is_ok()
                && !entry.arguments.is_empty()
            {
                return;
            }
            entry.arguments.push_str(arguments);
        }
    }

    /// Read out the assembled tool calls in index order.
    pub fn finish(self) -> Vec<AccumulatedToolCall> {
        self.entries
            .into_values()
            .map(|e| AccumulatedToolCall {
                id: e.id,
                name: e.name,
                arguments: e.arguments,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> StreamToolCallDelta {
        StreamToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: arguments.map(String::from),
        }
    }

    #[test]
    fn chunked_arguments_assemble_in_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&delta(0, Some("call_xyz789"), Some("search_database"), Some(r#"{"query":"#)));
        acc.feed(&delta(0, None, None, Some(r#""user data","#)));
        acc.feed(&delta(0, None, None, Some(r#""limit":100}"#)));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_xyz789");
        assert_eq!(calls[0].name, "search_database");
        assert_eq!(calls[0].arguments, r#"{"query":"user data","limit":100}"#);
    }

    #[test]
    fn multiple_indices_stay_independent_and_ordered() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&delta(1, Some("b"), Some("tool_b"), Some("{}")));
        acc.feed(&delta(0, Some("a"), Some("tool_a"), Some("{}")));

        let calls = acc.finish();
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[1].id, "b");
    }

    #[test]
    fn resent_whole_string_after_complete_json_is_ignored() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&delta(0, Some("call_1"), Some("f"), Some(r#"{"a":1}"#)));
        // Provider incorrectly re-sends the whole (now complete) argument
        // string again instead of an incremental continuation.
        acc.feed(&delta(0, None, None, Some(r#"{"a":1}"#)));

        let calls = acc.finish();
        assert_eq!(calls[0].arguments, r#"{"a":1}"#);
    }

    #[test]
    fn idempotent_with_single_blob_feed() {
        let mut chunked = ToolCallAccumulator::new();
        chunked.feed(&delta(0, Some("id"), Some("f"), Some(r#"{"a":"#)));
        chunked.feed(&delta(0, None, None, Some("1}")));

        let mut blob = ToolCallAccumulator::new();
        blob.feed(&delta(0, Some("id"), Some("f"), Some(r#"{"a":1}"#)));

        assert_eq!(chunked.finish(), blob.finish());
    }
}
