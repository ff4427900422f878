/// Model map (closed set): Anthropic model name → CodeWhisperer model id.
/// The haiku entry deliberately aliases to the Sonnet-3.7 upstream id.
pub const MODEL_MAP: &[(&str, &str)] = &[
    ("claude-sonnet-4-20250514", "CLAUDE_SONNET_4_20250514_V1_0"),
    ("claude-3-5-haiku-20241022", "CLAUDE_3_7_SONNET_20250219_V1_0"),
];

/// Resolve an Anthropic model name to the CodeWhisperer model id.
/// Unmapped models resolve to the empty string; upstream rejects those.
pub fn map_model_id(model: &str) -> &'static str {
    MODEL_MAP
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, id)| *id)
        .unwrap_or("")
}

/// Placeholder content used when a message yields no extractable text.
/// The typo is load-bearing: some call sites rely on non-empty content and
/// upstream tolerates the literal as-is.
pub const FALLBACK_CONTENT: &str = "answer for user qeustion";

/// Synthetic assistant acknowledgement paired with each system prompt
/// entry when system messages are folded into conversation history.
pub const SYSTEM_ACK: &str = "I will follow these instructions";

/// CodeWhisperer profile this proxy is pinned to.
pub const PROFILE_ARN: &str =
    "arn:aws:codewhisperer:us-east-1:699475941385:profile/EHGA3GRVQMUK";

pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_PORT: u16 = 8080;

/// Upper bound (exclusive, milliseconds) of the random delay inserted
/// between streamed SSE events. Overridable via KIRO2CC_STREAM_JITTER_MS.
pub const DEFAULT_STREAM_JITTER_MS: u64 = 300;
