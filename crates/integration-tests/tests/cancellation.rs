mod harness;

use std::time::Duration;

use futures_util::StreamExt;
use genlink_config::ProviderType;
use genlink_core::{CallContext, Interrupt};
use genlink_llm::{ErrorKind, GenerateRequest, LlmError, Message};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harness::client::{client, config};
use harness::sse;
use harness::stalled::StalledProvider;

fn first_delta() -> String {
    sse::frames(&[json!({
        "id": "chatcmpl-9",
        "object": "chat.completion.chunk",
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}, "finish_reason": null}]
    })])
}

fn request() -> GenerateRequest {
    GenerateRequest::new(vec![Message::user("Tell me a story")])
}

#[tokio::test]
async fn cancel_mid_stream_ends_call_once() {
    let provider = StalledProvider::start(first_delta()).await.unwrap();
    let (client, recorder) = client(config(ProviderType::Openai, "gpt-4o", &provider.base_url()));

    let ctx = CallContext::new();
    let mut stream = client.stream(&ctx, &request()).await.unwrap();
    assert_eq!(recorder.starts(), 1);

    // Let the first frame reach the aggregator
    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.cancel();

    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream closes promptly after cancel");
    assert!(next.is_none());

    assert_eq!(recorder.ends(), 1);
    let info = recorder.last_end();
    assert_eq!(info.error_kind, Some(ErrorKind::Canceled));
    let partial = info.response.expect("partial aggregate is reported");
    assert_eq!(partial.text(), Some("Hel"));
    assert!(recorder.usage_reports().is_empty());
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_call() {
    let provider = StalledProvider::start(first_delta()).await.unwrap();
    let (client, recorder) = client(config(ProviderType::Openai, "gpt-4o", &provider.base_url()));

    let stream = client.stream(&CallContext::new(), &request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), async {
        while recorder.ends() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("producer notices the dropped stream");

    assert_eq!(recorder.ends(), 1);
    assert_eq!(recorder.last_end().error_kind, Some(ErrorKind::Canceled));
}

#[tokio::test]
async fn deadline_during_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"content": "too late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let (client, recorder) = client(config(
        ProviderType::Openai,
        "gpt-4o",
        &format!("{}/v1", server.uri()),
    ));
    let ctx = CallContext::new().with_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = client.generate(&ctx, &request()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, LlmError::Canceled(Interrupt::DeadlineExceeded)));
    assert!(!err.is_retryable());
    assert_eq!(recorder.ends(), 1);
    assert_eq!(recorder.last_end().error_kind, Some(ErrorKind::Canceled));
}

#[tokio::test]
async fn already_canceled_context_fails_fast() {
    let server = MockServer::start().await;
    let (client, recorder) = client(config(
        ProviderType::Openai,
        "gpt-4o",
        &format!("{}/v1", server.uri()),
    ));
    let ctx = CallContext::new();
    ctx.cancel();

    let err = client.stream(&ctx, &request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(recorder.ends(), 1);
}
