// Anthropic /v1/messages request model, decoded up front so the rest of
// the pipeline never touches raw JSON shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::FALLBACK_CONTENT;

/// Anthropic messages request (the subset this proxy serves).
/// Sampling knobs are accepted but not forwarded; CodeWhisperer has no
/// equivalents.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ClaudeRequest {
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

/// `content` is a string, a block list, or (from lenient clients)
/// something else entirely. Shapes beyond the first two flatten to the
/// fallback literal.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },

    #[serde(other)]
    Unknown,
}

/// System prompt: the documented form is a block list; a bare string is
/// accepted and treated as a single block.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct SystemBlock {
    #[serde(rename = "type", default)]
    pub block_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Metadata {
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SystemPrompt {
    /// System prompt texts in order.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            SystemPrompt::Text(s) => vec![s.as_str()],
            SystemPrompt::Blocks(blocks) => blocks.iter().map(|b| b.text.as_str()).collect(),
        }
    }
}

/// Flatten message content to the single string CodeWhisperer accepts.
///
/// Text blocks contribute their text, tool_result blocks their result
/// content; everything else is ignored. Empty or unusable content
/// becomes the fallback literal.
pub fn get_message_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(s) => {
            if s.is_empty() {
                FALLBACK_CONTENT.to_string()
            } else {
                s.clone()
            }
        }
        MessageContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(text.clone()),
                    ContentBlock::ToolResult { content, .. } => {
                        parts.push(tool_result_text(content))
                    }
                    ContentBlock::Unknown => {}
                }
            }
            if parts.is_empty() {
                FALLBACK_CONTENT.to_string()
            } else {
                parts.join("\n")
            }
        }
        MessageContent::Other(_) => FALLBACK_CONTENT.to_string(),
    }
}

/// Extract the text of a tool_result `content` value. Clients send a
/// plain string or a list of text blocks.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Tool results of a message, re-wrapped into the CodeWhisperer
/// `userInputMessageContext.toolResults` shape.
pub fn extract_tool_results(content: &MessageContent) -> Vec<Value> {
    let mut results = Vec::new();
    if let MessageContent::Blocks(blocks) = content {
        for block in blocks {
            if let ContentBlock::ToolResult {
                tool_use_id,
                content,
            } = block
            {
                results.push(serde_json::json!({
                    "toolUseId": tool_use_id,
                    "content": [{"text": tool_result_text(content)}],
                    "status": "success"
                }));
            }
        }
    }
    results
}
