// /v1/messages handler: Anthropic request in, CodeWhisperer upstream
// call, Anthropic SSE stream or JSON message out.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::TokenFile;
use crate::proxy::errors::{error_response, AnthropicErrorType};
use crate::proxy::mappers::claude::{get_message_content, ClaudeRequest};
use crate::proxy::mappers::codewhisperer::build_codewhisperer_request;
use crate::proxy::server::AppState;
use crate::proxy::upstream::event_stream::parse_events;
use crate::proxy::upstream::sse::{translate, ResponseAggregator, SseEvent};

/// CodeWhisperer's rejection marker for requests it could not decode.
const IMPROPERLY_FORMED: &str = "Improperly formed request.";

pub async fn handle_messages(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request: ClaudeRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                AnthropicErrorType::InvalidRequestError,
                &format!("Invalid request body: {}", e),
            );
        }
    };

    if request.messages.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            AnthropicErrorType::InvalidRequestError,
            "messages must not be empty",
        );
    }

    info!(
        "Claude request | Model: {} | Stream: {} | Messages: {} | Tools: {}",
        request.model,
        request.stream,
        request.messages.len(),
        request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
    );

    let token = match state.token_store.read() {
        Ok(t) => t,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::AuthenticationError,
                &format!("Failed to load Kiro token: {}", e),
            );
        }
    };

    if request.stream {
        handle_stream(state, request, token).await
    } else {
        handle_non_stream(state, request, token).await
    }
}

async fn post_upstream(
    state: &AppState,
    body: String,
    access_token: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    state
        .client
        .post(format!("{}/generateAssistantResponse", state.upstream_host))
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "text/event-stream")
        .body(body)
        .send()
        .await
}

fn sse_error(message: String) -> SseEvent {
    SseEvent::new(
        "error",
        json!({
            "type": "error",
            "error": {
                "type": "api_error",
                "message": message
            }
        }),
    )
}

fn is_text_delta(ev: &SseEvent) -> Option<usize> {
    if ev.data["delta"]["type"] == "text_delta" {
        ev.data["delta"]["text"].as_str().map(|s| s.len())
    } else {
        None
    }
}

// ===== Streaming =====

async fn handle_stream(state: AppState, request: ClaudeRequest, token: TokenFile) -> Response {
    let message_id = format!("msg_{}", chrono::Local::now().format("%Y%m%d%H%M%S"));
    let model = request.model.clone();

    // message_start accounts the first message's flattened length as
    // input; the real tokenizer lives upstream.
    let input_tokens = request
        .messages
        .first()
        .map(|m| get_message_content(&m.content).len())
        .unwrap_or(0);

    let cw_request = build_codewhisperer_request(&request);
    let cw_body = match serde_json::to_string(&cw_request) {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::ApiError,
                &format!("Failed to serialize upstream request: {}", e),
            );
        }
    };

    let jitter_ms = state.stream_jitter_ms;

    let sse_stream = async_stream::stream! {
        let resp = match post_upstream(&state, cw_body, &token.access_token).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Upstream request failed: {}", e);
                yield Ok::<Bytes, std::io::Error>(Bytes::from(
                    sse_error(format!("Upstream request failed: {}", e)).to_wire(),
                ));
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Upstream error {}: {}", status.as_u16(), body);
            yield Ok(Bytes::from(
                sse_error(format!("CodeWhisperer API error: status {}", status.as_u16()))
                    .to_wire(),
            ));

            if status.as_u16() == 403 {
                // Credential likely expired; rotate it so the retry works.
                match state.token_store.refresh_if_stale(&token.access_token).await {
                    Ok(_) => info!("Token refreshed after upstream 403"),
                    Err(e) => warn!("Token refresh after 403 failed: {}", e),
                }
                yield Ok(Bytes::from(
                    sse_error("Token refreshed, please retry the request".to_string())
                        .to_wire(),
                ));
            } else {
                yield Ok(Bytes::from(sse_error(body).to_wire()));
            }
            return;
        }

        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to read upstream body: {}", e);
                yield Ok(Bytes::from(
                    sse_error(format!("Failed to read upstream response: {}", e)).to_wire(),
                ));
                return;
            }
        };

        let events = parse_events(&body);
        let translated = translate(&events);
        if translated.is_empty() {
            info!("Upstream produced no events, ending stream");
            return;
        }

        yield Ok(Bytes::from(
            SseEvent::new(
                "message_start",
                json!({
                    "type": "message_start",
                    "message": {
                        "id": message_id,
                        "type": "message",
                        "role": "assistant",
                        "content": [],
                        "model": model,
                        "stop_reason": null,
                        "stop_sequence": null,
                        "usage": {
                            "input_tokens": input_tokens,
                            "output_tokens": 1
                        }
                    }
                }),
            )
            .to_wire(),
        ));

        yield Ok(Bytes::from(
            SseEvent::new("ping", json!({"type": "ping"})).to_wire(),
        ));

        yield Ok(Bytes::from(
            SseEvent::new(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": {"type": "text", "text": ""}
                }),
            )
            .to_wire(),
        ));

        let mut output_tokens = 0usize;
        for (i, event) in translated.iter().enumerate() {
            if i > 0 && jitter_ms > 0 {
                let delay = { rand::thread_rng().gen_range(0..jitter_ms) };
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            if let Some(len) = is_text_delta(event) {
                output_tokens = len;
            }
            yield Ok(Bytes::from(event.to_wire()));
        }

        yield Ok(Bytes::from(
            SseEvent::new(
                "content_block_stop",
                json!({"type": "content_block_stop", "index": 0}),
            )
            .to_wire(),
        ));

        yield Ok(Bytes::from(
            SseEvent::new(
                "message_delta",
                json!({
                    "type": "message_delta",
                    "delta": {
                        "stop_reason": "end_turn",
                        "stop_sequence": null
                    },
                    "usage": {"output_tokens": output_tokens}
                }),
            )
            .to_wire(),
        ));

        yield Ok(Bytes::from(
            SseEvent::new("message_stop", json!({"type": "message_stop"})).to_wire(),
        ));
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from_stream(sse_stream))
        .unwrap()
}

// ===== Non-streaming =====

async fn handle_non_stream(state: AppState, request: ClaudeRequest, token: TokenFile) -> Response {
    let cw_request = build_codewhisperer_request(&request);
    let cw_body = match serde_json::to_string(&cw_request) {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::ApiError,
                &format!("Failed to serialize upstream request: {}", e),
            );
        }
    };

    let resp = match post_upstream(&state, cw_body, &token.access_token).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Upstream request failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::ApiError,
                &format!("Upstream request failed: {}", e),
            );
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("Upstream error {}: {}", status.as_u16(), body);
        if status.as_u16() == 403 {
            match state.token_store.refresh_if_stale(&token.access_token).await {
                Ok(_) => info!("Token refreshed after upstream 403"),
                Err(e) => warn!("Token refresh after 403 failed: {}", e),
            }
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::AuthenticationError,
                &body,
            );
        }
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            AnthropicErrorType::ApiError,
            &body,
        );
    }

    let body = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                AnthropicErrorType::ApiError,
                &format!("Failed to read upstream response: {}", e),
            );
        }
    };

    // Upstream reports schema rejections inside a 200 body.
    let body_text = String::from_utf8_lossy(&body);
    if body_text.contains(IMPROPERLY_FORMED) {
        return (StatusCode::BAD_REQUEST, body_text.into_owned()).into_response();
    }

    let events = parse_events(&body);
    let mut aggregator = ResponseAggregator::new();
    for event in &events {
        aggregator.push(event);
    }

    let input_tokens = request
        .messages
        .last()
        .map(|m| get_message_content(&m.content).len())
        .unwrap_or(0);
    let output_tokens = aggregator.text_len();
    let content = aggregator.into_content_blocks();

    Json(json!({
        "content": content,
        "model": request.model,
        "role": "assistant",
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "type": "message",
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens
        }
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use axum::routing::post;
    use axum::Router;
    use std::sync::Arc;

    /// Encode one upstream frame.
    fn frame(payload: &[u8]) -> Vec<u8> {
        let total_len = (12 + payload.len()) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&total_len.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn text_frames(chunks: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend(frame(
                format!(
                    r#"{{"content":"{}","name":"","toolUseId":"","stop":false}}"#,
                    chunk
                )
                .as_bytes(),
            ));
        }
        body
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    struct TestEnv {
        state: AppState,
        _dir: tempfile::TempDir,
        token_path: std::path::PathBuf,
    }

    /// AppState wired to a stub upstream and a temp token file; jitter
    /// disabled so tests run instantly.
    async fn test_env(upstream: Router, refresh_url: String) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("kiro-auth-token.json");
        std::fs::write(
            &token_path,
            r#"{"accessToken": "at-1", "refreshToken": "rt-1"}"#,
        )
        .unwrap();

        let upstream_host = spawn_stub(upstream).await;
        let state = AppState {
            token_store: Arc::new(TokenStore::with_paths(token_path.clone(), refresh_url)),
            client: reqwest::Client::new(),
            upstream_host,
            stream_jitter_ms: 0,
        };
        TestEnv {
            state,
            _dir: dir,
            token_path,
        }
    }

    async fn call(state: AppState, body: Value) -> (StatusCode, String) {
        let resp = handle_messages(State(state), Json(body)).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000_000)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn event_names(sse_body: &str) -> Vec<String> {
        sse_body
            .lines()
            .filter_map(|l| l.strip_prefix("event: "))
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_streaming_single_turn_event_order() {
        // S1: one text frame → full framed stream in order.
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async { text_frames(&["hello"]) }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            event_names(&body),
            vec![
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(body.contains(r#""text":"hello""#));
        // output_tokens tracks the last text delta's length.
        assert!(body.contains(r#""usage":{"output_tokens":5}"#));
    }

    #[tokio::test]
    async fn test_streaming_tool_use_events() {
        // S2: tool start, two input deltas, stop with tool identity.
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async {
                let mut body = Vec::new();
                body.extend(frame(br#"{"toolUseId":"t1","name":"calc","stop":false}"#));
                body.extend(frame(
                    br#"{"toolUseId":"t1","name":"calc","input":"{\"x\":","stop":false}"#,
                ));
                body.extend(frame(
                    br#"{"toolUseId":"t1","name":"calc","input":"1}","stop":false}"#,
                ));
                body.extend(frame(br#"{"toolUseId":"t1","name":"calc","stop":true}"#));
                body
            }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "stream": true,
                "messages": [{"role": "user", "content": "calc"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let names = event_names(&body);
        // Tool block start at index 1, nested inside the text framing.
        assert_eq!(
            names,
            vec![
                "message_start",
                "ping",
                "content_block_start", // index 0, text
                "content_block_start", // index 1, tool_use
                "content_block_delta",
                "content_block_delta",
                "content_block_stop", // index 1
                "message_delta",      // stop_reason: tool_use
                "content_block_stop", // index 0
                "message_delta",      // stop_reason: end_turn
                "message_stop"
            ]
        );
        assert!(body.contains(r#""partial_json":"{\"x\":""#));
        assert!(body.contains(r#""partial_json":"1}""#));
        assert!(body.contains(r#""stop_reason":"tool_use""#));
    }

    #[tokio::test]
    async fn test_streaming_empty_upstream_gives_empty_body() {
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async { Vec::<u8>::new() }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_403_refreshes_token_and_emits_two_errors() {
        // S5: upstream 403 → two error events, token file rotated.
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async { (StatusCode::FORBIDDEN, "expired") }),
        );
        let refresh = Router::new().route(
            "/refreshToken",
            post(|| async {
                Json(json!({"accessToken": "at-2", "refreshToken": "rt-2"}))
            }),
        );
        let refresh_base = spawn_stub(refresh).await;
        let env = test_env(upstream, format!("{}/refreshToken", refresh_base)).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(event_names(&body), vec!["error", "error"]);
        assert!(body.contains("status 403"));
        assert!(body.contains("please retry"));

        let on_disk = std::fs::read_to_string(&env.token_path).unwrap();
        assert!(on_disk.contains("at-2"));
    }

    #[tokio::test]
    async fn test_streaming_non_403_error_echoes_body() {
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(event_names(&body), vec!["error", "error"]);
        assert!(body.contains("status 500"));
        assert!(body.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_non_streaming_text_and_tool() {
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async {
                let mut body = text_frames(&["par", "tial"]);
                body.extend(frame(br#"{"toolUseId":"t1","name":"calc","stop":false}"#));
                body.extend(frame(
                    br#"{"toolUseId":"t1","name":"calc","input":"{\"x\":1}","stop":false}"#,
                ));
                body.extend(frame(br#"{"toolUseId":"t1","name":"calc","stop":true}"#));
                body
            }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["type"], "message");
        assert_eq!(parsed["role"], "assistant");
        assert_eq!(parsed["stop_reason"], "end_turn");
        assert_eq!(parsed["content"][0]["type"], "text");
        assert_eq!(parsed["content"][0]["text"], "partial");
        assert_eq!(parsed["content"][1]["type"], "tool_use");
        assert_eq!(parsed["content"][1]["input"]["x"], 1);
        assert_eq!(parsed["usage"]["input_tokens"], 2);
        assert_eq!(parsed["usage"]["output_tokens"], 7);
    }

    #[tokio::test]
    async fn test_non_streaming_improperly_formed_is_400() {
        let upstream = Router::new().route(
            "/generateAssistantResponse",
            post(|| async { "Improperly formed request." }),
        );
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Improperly formed request."));
    }

    #[tokio::test]
    async fn test_invalid_body_is_400() {
        let upstream = Router::new();
        let env = test_env(upstream, "http://unused".into()).await;

        let (status, body) = call(env.state.clone(), json!({"model": 42})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid_request_error"));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_500() {
        let upstream = Router::new();
        let env = test_env(upstream, "http://unused".into()).await;
        std::fs::remove_file(&env.token_path).unwrap();

        let (status, body) = call(
            env.state.clone(),
            json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 16,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Failed to load Kiro token"));
    }
}
