use bytes::{Bytes, BytesMut};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use genlink_core::{CallContext, Interrupt};
use tokio::sync::mpsc;

use super::{EventStream, Frame, StreamAggregator};
use crate::error::{ErrorKind, LlmError};
use crate::lifecycle::CallTracker;
use crate::parse;
use crate::provider::Provider;
use crate::session::SessionUpdate;
use crate::transport::ByteStream;
use crate::types::{GenerateResponse, StreamEvent};

/// Everything the producer task owns for one streaming call
pub(crate) struct StreamCall {
    pub provider: Provider,
    pub tracker: CallTracker,
    pub session: Option<SessionUpdate>,
}

/// Start the producer task for a streaming response body
pub(crate) fn spawn(call: StreamCall, body: ByteStream) -> EventStream {
    let ctx = call.tracker.context().child();
    let guard = ctx.cancellation_token().clone().drop_guard();
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(produce(ctx, call, body, tx));
    EventStream::new(rx, guard)
}

enum Body {
    /// Provider answered with a plain JSON document
    Whole(Bytes),
    /// Event stream; `head` holds the bytes already read
    Events { head: Bytes, rest: ByteStream },
}

async fn produce(ctx: CallContext, call: StreamCall, body: ByteStream, tx: mpsc::Sender<StreamEvent>) {
    let StreamCall {
        provider,
        tracker,
        session,
    } = call;

    match sniff(&ctx, body).await {
        Ok(Body::Whole(body)) => deliver_whole(&ctx, provider, tracker, session.as_ref(), body, &tx).await,
        Ok(Body::Events { head, rest }) => {
            drive_frames(&ctx, provider, tracker, session.as_ref(), head, rest, &tx).await;
        }
        Err(LlmError::Canceled(interrupt)) => close_interrupted(provider, tracker, interrupt, None),
        Err(e) => fail(&ctx, provider, tracker, session.as_ref(), e, None, None, &tx).await,
    }
}

/// Read until the first meaningful byte to tell JSON bodies from event streams
async fn sniff(ctx: &CallContext, mut body: ByteStream) -> Result<Body, LlmError> {
    let mut head = BytesMut::new();
    while head.iter().all(u8::is_ascii_whitespace) {
        match next_chunk(ctx, &mut body).await? {
            Some(chunk) => head.extend_from_slice(&chunk),
            None => break,
        }
    }

    let first = head.iter().find(|b| !b.is_ascii_whitespace()).copied();
    if !matches!(first, Some(b'{' | b'[')) {
        return Ok(Body::Events {
            head: head.freeze(),
            rest: body,
        });
    }

    while let Some(chunk) = next_chunk(ctx, &mut body).await? {
        head.extend_from_slice(&chunk);
    }
    Ok(Body::Whole(head.freeze()))
}

async fn next_chunk(ctx: &CallContext, body: &mut ByteStream) -> Result<Option<Bytes>, LlmError> {
    tokio::select! {
        biased;
        interrupt = ctx.done() => Err(LlmError::Canceled(interrupt)),
        chunk = body.next() => chunk.transpose(),
    }
}

async fn send(ctx: &CallContext, tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), Interrupt> {
    tokio::select! {
        biased;
        interrupt = ctx.done() => Err(interrupt),
        sent = tx.send(event) => sent.map_err(|_| Interrupt::Canceled),
    }
}

#[allow(clippy::too_many_lines)]
async fn drive_frames(
    ctx: &CallContext,
    provider: Provider,
    tracker: CallTracker,
    session: Option<&SessionUpdate>,
    head: Bytes,
    rest: ByteStream,
    tx: &mpsc::Sender<StreamEvent>,
) {
    let mut events = futures_util::stream::iter([Ok(head.clone())]).chain(rest).eventsource();
    let mut decoder = provider.decoder();
    let mut aggregator = StreamAggregator::new();
    // At most one finished choice is held back; trailing usage attaches to it
    let mut pending: Option<GenerateResponse> = None;
    let mut frames = 0_usize;

    let outcome: Result<(), LlmError> = 'frames: loop {
        let next = tokio::select! {
            biased;
            interrupt = ctx.done() => Err(interrupt),
            next = events.next() => Ok(next),
        };

        let event = match next {
            Err(interrupt) => break Err(LlmError::Canceled(interrupt)),
            Ok(None) => break Ok(()),
            Ok(Some(Err(e))) => break Err(frame_error(e)),
            Ok(Some(Ok(event))) => event,
        };

        frames += 1;
        let frame = Frame::from(event);
        if let Err(e) = tracker.on_delta(frame.data.as_bytes()) {
            break Err(e);
        }

        let deltas = match decoder.decode(&frame) {
            Ok(deltas) => deltas,
            Err(e) => break Err(e),
        };

        for delta in deltas {
            if let Some(finished) = aggregator.apply(delta)
                && let Some(previous) = pending.replace(finished)
                && let Err(interrupt) = send(ctx, tx, Ok(previous)).await
            {
                break 'frames Err(LlmError::Canceled(interrupt));
            }
        }

        if aggregator.is_done() {
            break Ok(());
        }
    };

    let partial = aggregator.partial();
    match outcome {
        Ok(()) if frames == 0 => {
            let error = if head.iter().all(u8::is_ascii_whitespace) {
                LlmError::protocol("empty response body", &head)
            } else {
                LlmError::protocol("unrecognized response body", &head)
            };
            fail(ctx, provider, tracker, session, error, None, None, tx).await;
        }
        Ok(()) => {
            if partial.choices.iter().any(|c| c.finish_reason.is_empty()) {
                tracing::debug!(provider = provider.name(), "stream ended without a finish reason");
            }
            if let (Some(last), Some(usage)) = (pending.as_mut(), aggregator.usage()) {
                last.usage = Some(usage);
            }
            if let Some(session) = session
                && aggregator.has_finished()
            {
                session.remember(aggregator.response_id());
            }

            let ended = tracker.succeed(partial);
            if let Some(last) = pending
                && send(ctx, tx, Ok(last)).await.is_err()
            {
                return;
            }
            if let Err(e) = ended {
                let _ = send(ctx, tx, Err(e)).await;
            }
        }
        Err(LlmError::Canceled(interrupt)) => close_interrupted(provider, tracker, interrupt, Some(partial)),
        Err(e) => fail(ctx, provider, tracker, session, e, Some(partial), pending, tx).await,
    }
}

async fn deliver_whole(
    ctx: &CallContext,
    provider: Provider,
    mut tracker: CallTracker,
    session: Option<&SessionUpdate>,
    body: Bytes,
    tx: &mpsc::Sender<StreamEvent>,
) {
    tracker.record_response_json(body.clone());
    let response = match parse::parse_body(provider, &body) {
        Ok(response) => response,
        Err(e) => return fail(ctx, provider, tracker, session, e, None, None, tx).await,
    };

    if let Some(session) = session {
        session.remember(response.id.as_deref());
    }

    let ended = tracker.succeed(response.clone());
    for event in split_choices(response) {
        if send(ctx, tx, Ok(event)).await.is_err() {
            return;
        }
    }
    if let Err(e) = ended {
        let _ = send(ctx, tx, Err(e)).await;
    }
}

/// One event per choice, usage on the last
pub(crate) fn split_choices(response: GenerateResponse) -> Vec<GenerateResponse> {
    let GenerateResponse {
        id,
        model,
        choices,
        usage,
        fallback,
    } = response;

    if choices.is_empty() {
        return vec![GenerateResponse {
            id,
            model,
            choices,
            usage,
            fallback,
        }];
    }

    let last = choices.len() - 1;
    choices
        .into_iter()
        .enumerate()
        .map(|(i, choice)| GenerateResponse {
            id: id.clone(),
            model: model.clone(),
            choices: vec![choice],
            usage: if i == last { usage } else { None },
            fallback,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn fail(
    ctx: &CallContext,
    provider: Provider,
    tracker: CallTracker,
    session: Option<&SessionUpdate>,
    error: LlmError,
    partial: Option<GenerateResponse>,
    pending: Option<GenerateResponse>,
    tx: &mpsc::Sender<StreamEvent>,
) {
    tracing::warn!(provider = provider.name(), error = %error, "stream failed");
    if error.kind() == ErrorKind::Continuation
        && let Some(session) = session
    {
        session.forget();
    }
    if let Err(end) = tracker.fail(&error, partial) {
        tracing::warn!(provider = provider.name(), error = %end, "end hook failed");
    }

    if let Some(last) = pending
        && send(ctx, tx, Ok(last)).await.is_err()
    {
        return;
    }
    let _ = send(ctx, tx, Err(error)).await;
}

/// Close a canceled stream without a trailing error event
fn close_interrupted(
    provider: Provider,
    tracker: CallTracker,
    interrupt: Interrupt,
    partial: Option<GenerateResponse>,
) {
    tracing::debug!(provider = provider.name(), reason = %interrupt, "stream interrupted");
    if let Err(e) = tracker.fail(&LlmError::Canceled(interrupt), partial) {
        tracing::warn!(provider = provider.name(), error = %e, "end hook failed");
    }
}

fn frame_error(error: EventStreamError<LlmError>) -> LlmError {
    match error {
        EventStreamError::Transport(e) => e,
        other => LlmError::protocol(format!("invalid event stream: {other}"), b""),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::lifecycle::{CallInfo, CallKind};
    use crate::test_support::{RecordingHook, chunked};
    use crate::types::Usage;

    const OPENAI_STREAM: &str = concat!(
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: [DONE]\n\n",
    );

    struct Harness {
        hook: Arc<RecordingHook>,
        usage_calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    fn start(provider: Provider, ctx: CallContext, body: ByteStream) -> (EventStream, Harness) {
        let hook = Arc::new(RecordingHook::default());
        let usage_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&usage_calls);
        let listener: Arc<dyn crate::lifecycle::UsageListener> = Arc::new(move |_: &str, _: &Usage| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let info = CallInfo::new(provider.name(), "m", CallKind::Stream, Bytes::from_static(b"{}"));
        let tracker = CallTracker::start(Some(hook.clone()), Some(listener), ctx, info).unwrap();
        let stream = spawn(
            StreamCall {
                provider,
                tracker,
                session: None,
            },
            body,
        );
        (stream, Harness { hook, usage_calls })
    }

    #[tokio::test]
    async fn text_stream_aggregates_with_usage_once() {
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), chunked(OPENAI_STREAM, 17));
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 1);
        let response = events[0].as_ref().unwrap();
        assert_eq!(response.text(), Some("Hello"));
        assert_eq!(response.usage, Some(Usage::new(5, 2)));
        assert_eq!(harness.hook.ends(), 1);
        assert_eq!(harness.usage_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(harness.hook.deltas(), 6);
    }

    async fn collect_one(provider: Provider, body: ByteStream) -> GenerateResponse {
        let (stream, _harness) = start(provider, CallContext::new(), body);
        let mut events: Vec<StreamEvent> = stream.collect().await;
        assert_eq!(events.len(), 1);
        events.remove(0).unwrap()
    }

    #[tokio::test]
    async fn chunk_boundaries_do_not_change_the_result() {
        let byte_at_a_time = collect_one(Provider::OpenAi, chunked(OPENAI_STREAM, 1)).await;
        let whole = collect_one(Provider::OpenAi, chunked(OPENAI_STREAM, OPENAI_STREAM.len())).await;
        let replayed = parse::parse_body(Provider::OpenAi, OPENAI_STREAM.as_bytes()).unwrap();

        assert_eq!(byte_at_a_time, whole);
        assert_eq!(whole, replayed);
        assert_eq!(whole.text(), Some("Hello"));
    }

    #[tokio::test]
    async fn unknown_frames_leave_the_result_unchanged() {
        let with_unknown = OPENAI_STREAM.replacen(
            "data: {\"id\":\"c1\",\"choices\":[{",
            "event: keepalive\ndata: {\"object\":\"keepalive\"}\n\ndata: {\"id\":\"c1\",\"choices\":[{",
            1,
        );
        assert_ne!(with_unknown, OPENAI_STREAM);

        let plain = collect_one(Provider::OpenAi, chunked(OPENAI_STREAM, 64)).await;
        let noisy = collect_one(Provider::OpenAi, chunked(&with_unknown, 64)).await;
        assert_eq!(plain, noisy);

        let anthropic = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude\",\"usage\":{\"input_tokens\":3,\"output_tokens\":0}}}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"4\"}}\n\n",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":1}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        let anthropic_noisy = anthropic.replacen(
            "event: message_delta",
            "event: brand_new_event\ndata: {\"type\":\"brand_new_event\",\"index\":0}\n\nevent: message_delta",
            1,
        );
        let plain = collect_one(Provider::Anthropic, chunked(anthropic, 32)).await;
        let noisy = collect_one(Provider::Anthropic, chunked(&anthropic_noisy, 32)).await;
        assert_eq!(plain, noisy);
        assert_eq!(plain.text(), Some("4"));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_ends_the_call_once() {
        let first = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        let body: ByteStream = Box::pin(futures_util::stream::iter([
            Ok(Bytes::from_static(first.as_bytes())),
            Err(LlmError::transport("body read failed", std::io::Error::other("connection reset"))),
        ]));
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), body);
        let events: Vec<StreamEvent> = stream.collect().await;

        assert!(matches!(events.as_slice(), [Err(LlmError::Transport { .. })]));
        assert_eq!(harness.hook.starts(), 1);
        assert_eq!(harness.hook.ends(), 1);
        let ended = harness.hook.last_end().unwrap();
        assert_eq!(ended.error_kind, Some(ErrorKind::Transport));
        assert_eq!(ended.response.unwrap().text(), Some("Hi"));
    }

    #[tokio::test]
    async fn malformed_frame_ends_with_protocol_error() {
        let body = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: {\"choices\": [\n\n";
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), chunked(body, 64));
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(LlmError::Protocol { .. })));
        assert_eq!(harness.hook.ends(), 1);
        let ended = harness.hook.last_end().unwrap();
        assert_eq!(ended.error_kind, Some(ErrorKind::Protocol));
        assert_eq!(ended.response.unwrap().text(), Some("Hi"));
    }

    #[tokio::test]
    async fn error_envelope_in_stream_is_an_error() {
        let body = "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n";
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), chunked(body, 64));
        let events: Vec<StreamEvent> = stream.collect().await;

        assert!(matches!(events.as_slice(), [Err(LlmError::Provider { .. })]));
        assert_eq!(harness.hook.ends(), 1);
    }

    #[tokio::test]
    async fn whole_json_body_is_replayed() {
        let body = r#"{"id":"msg_1","type":"message","role":"assistant","model":"claude","content":[{"type":"text","text":"4"}],"stop_reason":"end_turn","usage":{"input_tokens":3,"output_tokens":1}}"#;
        let (stream, harness) = start(Provider::Anthropic, CallContext::new(), chunked(body, 10));
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 1);
        let response = events[0].as_ref().unwrap();
        assert_eq!(response.text(), Some("4"));
        assert_eq!(response.usage, Some(Usage::new(3, 1)));
        assert!(harness.hook.last_end().unwrap().response_json.is_some());
    }

    #[tokio::test]
    async fn end_without_finish_reports_partial() {
        let body = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"cut o\"}}]}\n\n";
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), chunked(body, 64));
        let events: Vec<StreamEvent> = stream.collect().await;

        assert!(events.is_empty());
        let ended = harness.hook.last_end().unwrap();
        assert!(!ended.is_error());
        assert_eq!(ended.response.unwrap().text(), Some("cut o"));
    }

    #[tokio::test]
    async fn empty_body_is_a_protocol_error() {
        let (stream, _harness) = start(Provider::OpenAi, CallContext::new(), chunked("", 1));
        let events: Vec<StreamEvent> = stream.collect().await;
        assert!(matches!(events.as_slice(), [Err(LlmError::Protocol { .. })]));
    }

    #[tokio::test]
    async fn cancellation_closes_without_error() {
        let token = CancellationToken::new();
        let first = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        let body: ByteStream = Box::pin(
            futures_util::stream::iter([Ok(Bytes::from_static(first.as_bytes()))]).chain(futures_util::stream::pending()),
        );
        let (mut stream, harness) = start(
            Provider::OpenAi,
            CallContext::new().with_cancellation(token.clone()),
            body,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(harness.hook.ends(), 1);
        assert_eq!(harness.hook.last_end().unwrap().error_kind, Some(ErrorKind::Canceled));
    }

    #[tokio::test]
    async fn dropping_the_stream_ends_the_call() {
        let body: ByteStream = Box::pin(futures_util::stream::pending());
        let (stream, harness) = start(Provider::OpenAi, CallContext::new(), body);
        drop(stream);

        for _ in 0..100 {
            if harness.hook.ends() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(harness.hook.ends(), 1);
        assert_eq!(harness.hook.last_end().unwrap().error_kind, Some(ErrorKind::Canceled));
    }

    #[test]
    fn choices_split_with_usage_last() {
        let response = GenerateResponse {
            choices: vec![
                crate::types::Choice {
                    index: 0,
                    message: crate::types::Message::assistant("a"),
                    finish_reason: "stop".to_owned(),
                },
                crate::types::Choice {
                    index: 1,
                    message: crate::types::Message::assistant("b"),
                    finish_reason: "stop".to_owned(),
                },
            ],
            usage: Some(Usage::new(1, 2)),
            ..GenerateResponse::default()
        };
        let events = split_choices(response);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].usage, None);
        assert_eq!(events[1].usage, Some(Usage::new(1, 2)));
        assert_eq!(events[1].text(), Some("b"));
    }
}
