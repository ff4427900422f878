// Anthropic SSE event construction: the upstream→Anthropic translation
// table and the fold used by the non-streaming handler.

use serde_json::{json, Value};
use tracing::warn;

use crate::proxy::upstream::event_stream::AssistantEvent;

/// One server-sent event, rendered as `event: <name>\ndata: <json>\n\n`.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: &'static str,
    pub data: Value,
}

impl SseEvent {
    pub fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }

    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Translate one logical upstream event into its Anthropic SSE events.
///
/// Stateless and order-preserving. Text deltas always live at content
/// index 0, tool-use blocks at index 1.
pub fn translate_event(event: &AssistantEvent) -> Vec<SseEvent> {
    match event {
        AssistantEvent::Text { content } => vec![SseEvent::new(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {
                    "type": "text_delta",
                    "text": content
                }
            }),
        )],

        AssistantEvent::ToolUseStart { tool_use_id, name } => vec![SseEvent::new(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": 1,
                "content_block": {
                    "type": "tool_use",
                    "id": tool_use_id,
                    "name": name,
                    "input": {}
                }
            }),
        )],

        AssistantEvent::ToolUseDelta {
            tool_use_id,
            name,
            input,
        } => vec![SseEvent::new(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": 1,
                "delta": {
                    "type": "input_json_delta",
                    "id": tool_use_id,
                    "name": name,
                    "partial_json": input
                }
            }),
        )],

        AssistantEvent::Stop { tool_use } => {
            let mut out = vec![SseEvent::new(
                "content_block_stop",
                json!({
                    "type": "content_block_stop",
                    "index": 1
                }),
            )];
            if tool_use.is_some() {
                out.push(SseEvent::new(
                    "message_delta",
                    json!({
                        "type": "message_delta",
                        "delta": {
                            "stop_reason": "tool_use",
                            "stop_sequence": null
                        },
                        "usage": {"output_tokens": 0}
                    }),
                ));
            }
            out
        }
    }
}

pub fn translate(events: &[AssistantEvent]) -> Vec<SseEvent> {
    events.iter().flat_map(translate_event).collect()
}

struct PendingToolUse {
    id: String,
    name: String,
    input_buffer: String,
}

/// Folds logical events into the content array of a non-streaming
/// Anthropic message: one text block accumulated at index 0, tool_use
/// blocks appended as their input finishes.
#[derive(Default)]
pub struct ResponseAggregator {
    text: String,
    current_tool: Option<PendingToolUse>,
    tool_blocks: Vec<Value>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &AssistantEvent) {
        match event {
            AssistantEvent::Text { content } => self.text.push_str(content),

            AssistantEvent::ToolUseStart { tool_use_id, name } => {
                self.finish_tool();
                self.current_tool = Some(PendingToolUse {
                    id: tool_use_id.clone(),
                    name: name.clone(),
                    input_buffer: String::new(),
                });
            }

            AssistantEvent::ToolUseDelta {
                tool_use_id,
                name,
                input,
            } => {
                // A delta without a preceding start still carries the
                // tool identity; open the block from it.
                let tool = self.current_tool.get_or_insert_with(|| PendingToolUse {
                    id: tool_use_id.clone(),
                    name: name.clone(),
                    input_buffer: String::new(),
                });
                tool.input_buffer.push_str(input);
            }

            AssistantEvent::Stop { .. } => self.finish_tool(),
        }
    }

    fn finish_tool(&mut self) {
        if let Some(tool) = self.current_tool.take() {
            let input: Value = if tool.input_buffer.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&tool.input_buffer).unwrap_or_else(|e| {
                    warn!("Tool input was not valid JSON: {}", e);
                    json!({})
                })
            };
            self.tool_blocks.push(json!({
                "type": "tool_use",
                "id": tool.id,
                "name": tool.name,
                "input": input
            }));
        }
    }

    /// Byte length of the accumulated text, used for output_tokens.
    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    pub fn into_content_blocks(mut self) -> Vec<Value> {
        self.finish_tool();
        let mut blocks = Vec::new();
        if !self.text.is_empty() {
            blocks.push(json!({"type": "text", "text": self.text}));
        }
        blocks.extend(self.tool_blocks);
        blocks
    }
}
