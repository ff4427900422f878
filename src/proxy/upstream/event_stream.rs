// CodeWhisperer event-stream decoding.
//
// The upstream response body is a sequence of binary frames:
//
//   total_len(u32 BE) | header_len(u32 BE) | header | payload | crc32
//
// `total_len` covers the whole frame including the two length words.
// Headers and CRCs are skipped unverified. The payload is a JSON object,
// sometimes prefixed with the stray literal `"vent"` (the tail of the
// word "event" leaking out of the header block).

use bytes::Buf;
use serde::Deserialize;
use tracing::warn;

/// One logical upstream event, already classified by channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantEvent {
    /// Assistant text chunk.
    Text { content: String },
    /// A tool invocation begins; its arguments follow as deltas.
    ToolUseStart { tool_use_id: String, name: String },
    /// A fragment of the tool's JSON arguments.
    ToolUseDelta {
        tool_use_id: String,
        name: String,
        input: String,
    },
    /// Stream terminator; carries the tool identity when it closes a
    /// tool invocation.
    Stop { tool_use: Option<(String, String)> },
}

/// Wire shape of a frame payload. Exactly one channel is expected to be
/// populated per event.
#[derive(Debug, Default, Deserialize)]
struct RawAssistantEvent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "toolUseId")]
    tool_use_id: String,
    #[serde(default)]
    stop: bool,
}

fn classify(raw: RawAssistantEvent) -> Option<AssistantEvent> {
    if !raw.content.is_empty() {
        return Some(AssistantEvent::Text {
            content: raw.content,
        });
    }

    let has_tool = !raw.tool_use_id.is_empty() && !raw.name.is_empty();
    if has_tool && !raw.stop {
        return Some(match raw.input {
            None => AssistantEvent::ToolUseStart {
                tool_use_id: raw.tool_use_id,
                name: raw.name,
            },
            Some(input) => AssistantEvent::ToolUseDelta {
                tool_use_id: raw.tool_use_id,
                name: raw.name,
                input,
            },
        });
    }

    if raw.stop {
        return Some(AssistantEvent::Stop {
            tool_use: has_tool.then_some((raw.tool_use_id, raw.name)),
        });
    }

    None
}

/// Decode a complete upstream response body into logical events.
///
/// Pure and truncation-tolerant: parsing stops cleanly when fewer than
/// 12 bytes remain or a declared length would overrun the buffer, and a
/// payload that fails to parse is skipped without aborting the walk.
pub fn parse_events(body: &[u8]) -> Vec<AssistantEvent> {
    let mut events = Vec::new();
    let mut buf = body;

    loop {
        if buf.remaining() < 12 {
            break;
        }

        let total_len = buf.get_u32() as usize;
        let header_len = buf.get_u32() as usize;

        // total_len counts the whole frame, including the 8 bytes just
        // consumed; the rest of the frame must fit in what remains.
        if total_len > buf.remaining() + 8 {
            warn!("Frame length invalid");
            break;
        }
        let payload_len = match total_len.checked_sub(header_len + 12) {
            Some(n) => n,
            None => {
                warn!("Frame length invalid");
                break;
            }
        };

        buf.advance(header_len);
        let payload = &buf[..payload_len];
        let payload = payload.strip_prefix(b"vent".as_slice()).unwrap_or(payload);

        match serde_json::from_slice::<RawAssistantEvent>(payload) {
            Ok(raw) => {
                if let Some(event) = classify(raw) {
                    events.push(event);
                }
            }
            Err(e) => warn!("Skipping unparseable frame payload: {}", e),
        }

        buf.advance(payload_len);
        buf.advance(4); // CRC32, unverified
    }

    events
}
