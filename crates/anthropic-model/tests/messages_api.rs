use std::future::poll_fn;
use std::pin::pin;

use mirror_agent_anthropic_model::{AnthropicConfigBuilder, AnthropicProvider};
use mirror_agent_model::{
    ContentBlock, ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM: &str = include_str!("../fixtures/tool_use_response.txt");

fn provider(server: &MockServer) -> AnthropicProvider {
    let config = AnthropicConfigBuilder::with_api_key("test_api_key")
        .with_base_url(server.uri())
        .with_model("claude-test")
        .with_max_tokens(256)
        .with_temperature(0.5)
        .build();
    AnthropicProvider::new(config)
}

fn request() -> ModelRequest {
    ModelRequest {
        system: Some("Operate the phone.".to_owned()),
        messages: vec![ModelMessage::user(vec![ContentBlock::Text(
            "Here's the initial screenshot".to_owned(),
        )])],
        tools: vec![],
    }
}

#[tokio::test]
async fn test_streams_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test_api_key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "max_tokens": 256,
            "temperature": 0.5,
            "system": "Operate the phone.",
            "stream": true
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(STREAM.as_bytes(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resp = provider(&server).send_request(&request()).await.unwrap();
    let mut resp = pin!(resp);
    let mut tool_names = Vec::new();
    let mut finish_reason = None;
    while let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
        .await
        .unwrap()
    {
        match event {
            ModelResponseEvent::ToolCall(req) => tool_names.push(req.name),
            ModelResponseEvent::Completed(reason) => finish_reason = Some(reason),
            ModelResponseEvent::MessageDelta(_) => {}
        }
    }

    assert_eq!(tool_names, ["move_cursor", "click_cursor"]);
    assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));
}

#[tokio::test]
async fn test_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "type": "error",
            "error": {
                "type": "rate_limit_error",
                "message": "Number of requests has exceeded your rate limit"
            }
        })))
        .mount(&server)
        .await;

    let err = provider(&server).send_request(&request()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert!(err.message().contains("exceeded your rate limit"));
}

#[tokio::test]
async fn test_rejects_non_stream_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "message",
            "content": []
        })))
        .mount(&server)
        .await;

    let err = provider(&server).send_request(&request()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.message().starts_with("Unexpected content type"));
}
