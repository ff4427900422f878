// CodeWhisperer generateAssistantResponse request model and the
// Anthropic → CodeWhisperer translation.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{map_model_id, PROFILE_ARN, SYSTEM_ACK};
use crate::proxy::mappers::claude::{
    extract_tool_results, get_message_content, ClaudeRequest, Tool,
};

pub const CHAT_TRIGGER_TYPE: &str = "MANUAL";
pub const ORIGIN: &str = "AI_EDITOR";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeWhispererRequest {
    pub conversation_state: ConversationState,
    pub profile_arn: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub chat_trigger_type: String,
    pub conversation_id: String,
    pub current_message: CurrentMessage,
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMessage {
    pub user_input_message: UserInputMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessage {
    pub content: String,
    pub model_id: String,
    pub origin: String,
    pub user_input_message_context: UserInputMessageContext,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub tool_specification: ToolSpecification,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSchema {
    pub json: Value,
}

/// One history entry: either side of a conversation turn.
/// Serializes externally tagged, i.e. `{"userInputMessage": {...}}` or
/// `{"assistantResponseMessage": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryItem {
    UserInputMessage(HistoryUserMessage),
    AssistantResponseMessage(HistoryAssistantMessage),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryUserMessage {
    pub content: String,
    pub model_id: String,
    pub origin: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryAssistantMessage {
    pub content: String,
    pub tool_uses: Vec<Value>,
}

fn wrap_tools(tools: &[Tool]) -> Vec<ToolSpec> {
    tools
        .iter()
        .map(|tool| ToolSpec {
            tool_specification: ToolSpecification {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: InputSchema {
                    json: tool.input_schema.clone(),
                },
            },
        })
        .collect()
}

/// Fold system prompts and prior messages into history.
///
/// Each system entry becomes a synthetic (user, assistant-ack) pair.
/// Prior messages are walked in order: a user message emits a user item
/// and claims the directly following assistant message as its pair;
/// assistants without a preceding user are dropped. The last message is
/// never history, it is promoted to the current message.
fn build_history(req: &ClaudeRequest, model_id: &str) -> Vec<HistoryItem> {
    let mut history = Vec::new();

    let system_texts: Vec<&str> = req
        .system
        .as_ref()
        .map(|s| s.texts())
        .unwrap_or_default();

    if system_texts.is_empty() && req.messages.len() <= 1 {
        return history;
    }

    for text in system_texts {
        history.push(HistoryItem::UserInputMessage(HistoryUserMessage {
            content: text.to_string(),
            model_id: model_id.to_string(),
            origin: ORIGIN.to_string(),
        }));
        history.push(HistoryItem::AssistantResponseMessage(
            HistoryAssistantMessage {
                content: SYSTEM_ACK.to_string(),
                tool_uses: Vec::new(),
            },
        ));
    }

    let prior = &req.messages[..req.messages.len().saturating_sub(1)];
    let mut i = 0;
    while i < prior.len() {
        if prior[i].role == "user" {
            history.push(HistoryItem::UserInputMessage(HistoryUserMessage {
                content: get_message_content(&prior[i].content),
                model_id: model_id.to_string(),
                origin: ORIGIN.to_string(),
            }));
            if i + 1 < prior.len() && prior[i + 1].role == "assistant" {
                history.push(HistoryItem::AssistantResponseMessage(
                    HistoryAssistantMessage {
                        content: get_message_content(&prior[i + 1].content),
                        tool_uses: Vec::new(),
                    },
                ));
                i += 2;
                continue;
            }
        }
        i += 1;
    }

    history
}

/// Translate a validated Anthropic request into the CodeWhisperer
/// payload. Pure apart from the fresh conversation id.
pub fn build_codewhisperer_request(req: &ClaudeRequest) -> CodeWhispererRequest {
    build_with_conversation_id(req, Uuid::new_v4().to_string())
}

fn build_with_conversation_id(req: &ClaudeRequest, conversation_id: String) -> CodeWhispererRequest {
    let model_id = map_model_id(&req.model).to_string();

    let current = req.messages.last();
    let content = current
        .map(|m| get_message_content(&m.content))
        .unwrap_or_else(|| crate::constants::FALLBACK_CONTENT.to_string());

    let tools = req
        .tools
        .as_deref()
        .map(wrap_tools)
        .filter(|specs| !specs.is_empty());

    let tool_results = current
        .map(|m| extract_tool_results(&m.content))
        .filter(|results| !results.is_empty());

    CodeWhispererRequest {
        conversation_state: ConversationState {
            chat_trigger_type: CHAT_TRIGGER_TYPE.to_string(),
            conversation_id,
            current_message: CurrentMessage {
                user_input_message: UserInputMessage {
                    content,
                    model_id: model_id.clone(),
                    origin: ORIGIN.to_string(),
                    user_input_message_context: UserInputMessageContext {
                        tools,
                        tool_results,
                    },
                },
            },
            history: build_history(req, &model_id),
        },
        profile_arn: PROFILE_ARN.to_string(),
    }
}
