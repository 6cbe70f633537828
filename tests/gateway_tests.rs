//! Gateway wire contracts against a mock HTTP backend.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hal::error::HalError;
use hal::gateway::{HttpGateway, LlmGateway, OllamaGateway};
use hal::types::{Message, ToolCall, ToolSpec};

const TIMEOUT: Duration = Duration::from_secs(5);

fn weather_tool() -> ToolSpec {
    ToolSpec::new(
        "get_forecast",
        "Forecast for a city",
        json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    )
}

#[tokio::test]
async fn generate_posts_history_and_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "system", "content": "You are HAL."},
                {"role": "user", "content": "weather?"}
            ],
            "tools": [{"type": "function", "function": {"name": "get_forecast"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"role": "assistant", "content": "Clear skies."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    let reply = gateway
        .generate(
            &[Message::system("You are HAL."), Message::user("weather?")],
            Some(&[weather_tool()]),
        )
        .await
        .unwrap();

    assert_eq!(reply, Message::assistant("Clear skies."));
}

#[tokio::test]
async fn generate_decodes_tool_calls_with_string_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_forecast", "arguments": "{\"city\": \"Urbana\"}"}
                }]
            }
        })))
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    let reply = gateway
        .generate(&[Message::user("weather?")], Some(&[weather_tool()]))
        .await
        .unwrap();

    assert_eq!(reply.content(), "");
    assert_eq!(
        reply.tool_calls(),
        [ToolCall::new("call_1", "get_forecast", json!({"city": "Urbana"}))]
    );
}

#[tokio::test]
async fn generate_without_tools_sends_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(json!({"tools": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"role": "assistant", "content": "Done."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    gateway.generate(&[Message::user("hi")], None).await.unwrap();
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "model loading"})))
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    let err = gateway.generate(&[Message::user("hi")], None).await.unwrap_err();

    assert!(matches!(err, HalError::GatewayUnavailable(ref message) if message.contains("model loading")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    let err = gateway.generate(&[Message::user("hi")], None).await.unwrap_err();

    assert!(matches!(err, HalError::GatewayProtocol(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn non_assistant_reply_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"role": "user", "content": "hi"}
        })))
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&server.uri(), TIMEOUT).unwrap();
    let err = gateway.generate(&[Message::user("hi")], None).await.unwrap_err();

    assert!(matches!(err, HalError::GatewayProtocol(_)));
}

#[tokio::test]
async fn unreachable_backend_is_unavailable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let gateway = HttpGateway::new(&uri, TIMEOUT).unwrap();
    let err = gateway.generate(&[Message::user("hi")], None).await.unwrap_err();

    assert!(matches!(err, HalError::GatewayUnavailable(_)));
}

#[tokio::test]
async fn ollama_chat_request_and_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "qwen3:latest",
            "stream": false,
            "think": false,
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen3:latest",
            "message": {"role": "assistant", "content": "Hello, Dave."},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = OllamaGateway::new(&server.uri(), "qwen3:latest", TIMEOUT).unwrap();
    let reply = gateway.generate(&[Message::user("hi")], None).await.unwrap();

    assert_eq!(reply, Message::assistant("Hello, Dave."));
}

#[tokio::test]
async fn ollama_missing_model_is_a_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})))
        .mount(&server)
        .await;

    let gateway = OllamaGateway::new(&server.uri(), "nope", TIMEOUT).unwrap();
    let err = gateway.generate(&[Message::user("hi")], None).await.unwrap_err();

    assert!(matches!(err, HalError::GatewayProtocol(ref message) if message.contains("not found")));
}
