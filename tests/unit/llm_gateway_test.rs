use futures::StreamExt;
use neonchat::models::internal::Message;
use neonchat::services::llm_gateway::{AnthropicGateway, GatewayError, LlmGateway};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO_STREAM: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
event: ping\n\
data: {\"type\":\"ping\"}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n\
event: content_block_stop\n\
data: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

fn gateway(server: &MockServer) -> AnthropicGateway {
    AnthropicGateway::new(
        server.uri(),
        "test-key".to_string(),
        "claude-3-5-sonnet-20240620".to_string(),
        256,
    )
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

async fn collect(
    gateway: &AnthropicGateway,
    messages: &[Message],
) -> Vec<Result<String, GatewayError>> {
    gateway.stream_reply(messages).await.unwrap().collect().await
}

#[tokio::test]
async fn test_stream_reply_yields_text_deltas() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-sonnet-20240620",
            "max_tokens": 256,
            "stream": true,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(sse(HELLO_STREAM))
        .expect(1)
        .mount(&server)
        .await;

    let items = collect(&gateway(&server), &[Message::user("hello")]).await;
    let text: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(text, vec!["hi".to_string(), " there".to_string()]);
}

#[tokio::test]
async fn test_system_messages_become_system_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "system": "be brief\n\nbe kind",
            "messages": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "hi"},
                {"role": "user", "content": "again"}
            ]
        })))
        .respond_with(sse(HELLO_STREAM))
        .expect(1)
        .mount(&server)
        .await;

    let messages = vec![
        Message::system("be brief"),
        Message::user("hello"),
        Message::assistant("hi"),
        Message::system("be kind"),
        Message::user("again"),
    ];
    let items = collect(&gateway(&server), &messages).await;
    assert!(items.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_error_status_fails_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let result = gateway(&server).stream_reply(&[Message::user("hello")]).await;
    match result {
        Err(GatewayError::ApiError { status, message }) => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid x-api-key"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_error_event_ends_stream_with_provider_error() {
    let server = MockServer::start().await;
    let body = "event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"par\"}}\n\n\
event: error\n\
data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let items = collect(&gateway(&server), &[Message::user("hello")]).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "par");
    assert!(matches!(&items[1], Err(GatewayError::Provider(m)) if m.contains("overloaded_error")));
}

#[tokio::test]
async fn test_truncated_stream_is_an_error() {
    let server = MockServer::start().await;
    let body = "event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let items = collect(&gateway(&server), &[Message::user("hello")]).await;

    assert_eq!(items.len(), 2);
    assert!(matches!(items.last(), Some(Err(GatewayError::InvalidResponse(_)))));
}

#[tokio::test]
async fn test_unreachable_provider_is_http_error() {
    let gateway = AnthropicGateway::new(
        "http://127.0.0.1:1".to_string(),
        "k".to_string(),
        "m".to_string(),
        16,
    );

    let result = gateway.stream_reply(&[Message::user("hello")]).await;
    assert!(matches!(result, Err(GatewayError::HttpError(_))));
}
