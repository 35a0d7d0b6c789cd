mod harness;

use futures_util::StreamExt;
use genlink_config::ProviderType;
use genlink_core::CallContext;
use genlink_llm::{CallKind, ErrorKind, GenerateOptions, GenerateRequest, Message, StreamEvent, Usage};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harness::client::{client, config};

/// Provider that refuses streaming and answers plain requests
async fn refusing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Streaming is not supported for this model",
                "type": "invalid_request_error"
            }
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-3",
            "model": "o1-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Done"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 1, "total_tokens": 8}
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn refused_stream_is_served_whole() {
    let server = refusing_server().await;
    let (client, recorder) = client(config(
        ProviderType::Openai,
        "o1-mini",
        &format!("{}/v1", server.uri()),
    ));

    let events: Vec<StreamEvent> = client
        .stream(&CallContext::new(), &GenerateRequest::new(vec![Message::user("go")]))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    let response = events[0].as_ref().unwrap();
    assert!(response.fallback);
    assert_eq!(response.text(), Some("Done"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let retried: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_ne!(retried["stream"], json!(true));

    assert_eq!(recorder.starts(), 1);
    assert_eq!(recorder.ends(), 1);
    let info = recorder.last_end();
    assert_eq!(info.kind, CallKind::Stream);
    assert!(info.fallback);
    assert!(!info.is_error());
    assert_eq!(recorder.usage_reports(), vec![Usage::new(7, 1)]);
}

#[tokio::test]
async fn caller_can_refuse_the_fallback() {
    let server = refusing_server().await;
    let (client, recorder) = client(config(
        ProviderType::Openai,
        "o1-mini",
        &format!("{}/v1", server.uri()),
    ));
    let request = GenerateRequest::new(vec![Message::user("go")]).with_options(GenerateOptions {
        disable_stream_fallback: true,
        ..GenerateOptions::default()
    });

    let err = client.stream(&CallContext::new(), &request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(recorder.ends(), 1);
    assert!(!recorder.last_end().fallback);
}
