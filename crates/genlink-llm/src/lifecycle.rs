//! Per-call lifecycle reporting
//!
//! Every call is announced once to the client's [`CallHook`] before it is
//! dispatched and closed exactly once afterwards, whatever the outcome.
//! Usage goes to the [`UsageListener`] at most once per call.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use genlink_core::CallContext;

use crate::error::{ErrorKind, LlmError};
use crate::types::{GenerateResponse, Usage};

/// Kind of generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CallKind {
    Generate,
    Stream,
}

/// Everything known about a call, filled in as it progresses
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Provider name (e.g. "anthropic")
    pub provider: &'static str,
    /// Model identifier sent to the provider
    pub model: String,
    /// Generate or stream
    pub kind: CallKind,
    /// Exact request body sent
    pub request_json: Bytes,
    /// Raw response body, for calls that received one whole
    pub response_json: Option<Bytes>,
    /// Normalized response, or the partial aggregate of an interrupted stream
    pub response: Option<GenerateResponse>,
    /// Token usage
    pub usage: Option<Usage>,
    /// Finish reason of the first choice
    pub finish_reason: Option<String>,
    /// Wall-clock start
    pub started_at: SystemTime,
    /// Time from start to end
    pub elapsed: Duration,
    /// Error message when the call failed
    pub error: Option<String>,
    /// Error classification when the call failed
    pub error_kind: Option<ErrorKind>,
    /// Streaming call served by the non-streaming fallback
    pub fallback: bool,
}

impl CallInfo {
    pub fn new(provider: &'static str, model: impl Into<String>, kind: CallKind, request_json: Bytes) -> Self {
        Self {
            provider,
            model: model.into(),
            kind,
            request_json,
            response_json: None,
            response: None,
            usage: None,
            finish_reason: None,
            started_at: SystemTime::now(),
            elapsed: Duration::ZERO,
            error: None,
            error_kind: None,
            fallback: false,
        }
    }

    /// Whether the call ended with an error
    pub const fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Observer of call start and end
///
/// Hooks run on the task driving the call and must not block. Errors
/// returned from either method fail the call.
pub trait CallHook: Send + Sync {
    /// Called once before dispatch; may enrich the context (e.g. with a
    /// correlation id) that the rest of the call sees
    fn on_call_start(&self, ctx: CallContext, info: &CallInfo) -> anyhow::Result<CallContext> {
        let _ = info;
        Ok(ctx)
    }

    /// Called exactly once when the call ends
    fn on_call_end(&self, ctx: &CallContext, info: &CallInfo) -> anyhow::Result<()>;

    /// Called with the raw data of every stream frame
    fn on_stream_delta(&self, ctx: &CallContext, frame: &[u8]) -> anyhow::Result<()> {
        let _ = (ctx, frame);
        Ok(())
    }
}

/// Receives token usage, at most once per call
pub trait UsageListener: Send + Sync {
    fn on_usage(&self, model: &str, usage: &Usage);
}

impl<F> UsageListener for F
where
    F: Fn(&str, &Usage) + Send + Sync,
{
    fn on_usage(&self, model: &str, usage: &Usage) {
        self(model, usage);
    }
}

/// Hook that writes lifecycle events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl CallHook for TracingHook {
    fn on_call_start(&self, ctx: CallContext, info: &CallInfo) -> anyhow::Result<CallContext> {
        let ctx = ctx.ensure_correlation_id();
        tracing::debug!(
            provider = info.provider,
            model = %info.model,
            kind = %info.kind,
            correlation_id = ctx.correlation_id().unwrap_or_default(),
            "generation call started"
        );
        Ok(ctx)
    }

    fn on_call_end(&self, ctx: &CallContext, info: &CallInfo) -> anyhow::Result<()> {
        let correlation_id = ctx.correlation_id().unwrap_or_default();
        let elapsed_ms = u64::try_from(info.elapsed.as_millis()).unwrap_or(u64::MAX);

        if let (Some(error), Some(kind)) = (&info.error, info.error_kind) {
            tracing::warn!(
                provider = info.provider,
                model = %info.model,
                kind = %info.kind,
                correlation_id,
                error_kind = %kind,
                error = %error,
                elapsed_ms,
                "generation call failed"
            );
        } else {
            let usage = info.usage.unwrap_or_default();
            tracing::info!(
                provider = info.provider,
                model = %info.model,
                kind = %info.kind,
                correlation_id,
                finish_reason = info.finish_reason.as_deref().unwrap_or_default(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                fallback = info.fallback,
                elapsed_ms,
                "generation call completed"
            );
        }
        Ok(())
    }
}

/// Owns the reporting obligations of one call
///
/// Dropping a tracker that was never ended closes the call as canceled, so
/// the end hook fires exactly once on every path, including a consumer
/// dropping a stream mid-way.
pub(crate) struct CallTracker {
    hook: Option<Arc<dyn CallHook>>,
    usage_listener: Option<Arc<dyn UsageListener>>,
    ctx: CallContext,
    info: CallInfo,
    started: Instant,
    ended: bool,
}

impl CallTracker {
    /// Announce the call to the hook
    ///
    /// A failing start hook still gets its end call, and the hook error is
    /// returned as the call's failure.
    pub fn start(
        hook: Option<Arc<dyn CallHook>>,
        usage_listener: Option<Arc<dyn UsageListener>>,
        ctx: CallContext,
        info: CallInfo,
    ) -> Result<Self, LlmError> {
        let mut tracker = Self {
            hook,
            usage_listener,
            ctx,
            info,
            started: Instant::now(),
            ended: false,
        };

        if let Some(hook) = tracker.hook.clone() {
            match hook.on_call_start(tracker.ctx.clone(), &tracker.info) {
                Ok(ctx) => tracker.ctx = ctx,
                Err(e) => {
                    let error = LlmError::hook("on_call_start", &e);
                    if let Err(end) = tracker.fail(&error, None) {
                        tracing::warn!(error = %end, "end hook failed after start hook failure");
                    }
                    return Err(error);
                }
            }
        }

        Ok(tracker)
    }

    /// Context as returned by the start hook
    pub const fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Replace the request body, for calls that sent a different one
    pub fn record_request_json(&mut self, body: Bytes) {
        self.info.request_json = body;
    }

    pub fn record_response_json(&mut self, body: Bytes) {
        self.info.response_json = Some(body);
    }

    pub const fn mark_fallback(&mut self) {
        self.info.fallback = true;
    }

    /// Forward one raw stream frame to the hook
    pub fn on_delta(&self, frame: &[u8]) -> Result<(), LlmError> {
        match &self.hook {
            Some(hook) => hook
                .on_stream_delta(&self.ctx, frame)
                .map_err(|e| LlmError::hook("on_stream_delta", &e)),
            None => Ok(()),
        }
    }

    /// End the call successfully
    pub fn succeed(mut self, response: GenerateResponse) -> Result<(), LlmError> {
        self.record(Some(response), None);
        self.finish()
    }

    /// End the call with an error, keeping whatever was produced
    pub fn fail(mut self, error: &LlmError, partial: Option<GenerateResponse>) -> Result<(), LlmError> {
        self.record(partial, Some(error));
        self.finish()
    }

    fn record(&mut self, response: Option<GenerateResponse>, error: Option<&LlmError>) {
        if let Some(response) = response {
            self.info.usage = self.info.usage.or(response.usage);
            self.info.finish_reason = response
                .finish_reason()
                .filter(|r| !r.is_empty())
                .map(ToOwned::to_owned);
            self.info.response = Some(response);
        }
        if let Some(error) = error {
            self.info.error = Some(error.to_string());
            self.info.error_kind = Some(error.kind());
        }
    }

    fn finish(&mut self) -> Result<(), LlmError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.info.elapsed = self.started.elapsed();

        if let (Some(listener), Some(usage)) = (&self.usage_listener, self.info.usage) {
            listener.on_usage(&self.info.model, &usage);
        }

        match &self.hook {
            Some(hook) => hook
                .on_call_end(&self.ctx, &self.info)
                .map_err(|e| LlmError::hook("on_call_end", &e)),
            None => Ok(()),
        }
    }
}

impl Drop for CallTracker {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let interrupt = self
            .ctx
            .interrupted()
            .unwrap_or(genlink_core::Interrupt::Canceled);
        self.record(None, Some(&LlmError::Canceled(interrupt)));
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "end hook failed for abandoned call");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_support::RecordingHook;
    use crate::types::{Choice, Message};

    fn info() -> CallInfo {
        CallInfo::new("openai", "gpt-4o", CallKind::Generate, Bytes::from_static(b"{}"))
    }

    fn response(usage: Option<Usage>) -> GenerateResponse {
        GenerateResponse {
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("4"),
                finish_reason: "stop".to_owned(),
            }],
            usage,
            ..GenerateResponse::default()
        }
    }

    #[test]
    fn success_ends_once_with_usage() {
        let hook = Arc::new(RecordingHook::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener: Arc<dyn UsageListener> = Arc::new(move |model: &str, usage: &Usage| {
            assert_eq!(model, "gpt-4o");
            assert_eq!(*usage, Usage::new(3, 1));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let tracker = CallTracker::start(Some(hook.clone()), Some(listener), CallContext::new(), info()).unwrap();
        tracker.succeed(response(Some(Usage::new(3, 1)))).unwrap();

        assert_eq!(hook.starts(), 1);
        assert_eq!(hook.ends(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let ended = hook.last_end().unwrap();
        assert_eq!(ended.finish_reason.as_deref(), Some("stop"));
        assert!(!ended.is_error());
    }

    #[test]
    fn failing_start_hook_still_ends() {
        let hook = Arc::new(RecordingHook::failing_start());
        let err = CallTracker::start(Some(hook.clone()), None, CallContext::new(), info())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Hook);
        assert_eq!(hook.ends(), 1);
        assert_eq!(hook.last_end().unwrap().error_kind, Some(ErrorKind::Hook));
    }

    #[test]
    fn failing_end_hook_fails_the_call() {
        let hook = Arc::new(RecordingHook::failing_end());
        let tracker = CallTracker::start(Some(hook.clone()), None, CallContext::new(), info()).unwrap();
        let err = tracker.succeed(response(None)).unwrap_err();
        assert!(matches!(err, LlmError::Hook { stage: "on_call_end", .. }));
        assert_eq!(hook.ends(), 1);
    }

    #[test]
    fn dropped_tracker_ends_as_canceled() {
        let hook = Arc::new(RecordingHook::default());
        let tracker = CallTracker::start(Some(hook.clone()), None, CallContext::new(), info()).unwrap();
        drop(tracker);
        assert_eq!(hook.ends(), 1);
        assert_eq!(hook.last_end().unwrap().error_kind, Some(ErrorKind::Canceled));
    }

    #[test]
    fn failure_keeps_partial_response() {
        let hook = Arc::new(RecordingHook::default());
        let tracker = CallTracker::start(Some(hook.clone()), None, CallContext::new(), info()).unwrap();
        let err = LlmError::protocol("bad frame", b"{");
        tracker.fail(&err, Some(response(None))).unwrap();

        let ended = hook.last_end().unwrap();
        assert_eq!(ended.error_kind, Some(ErrorKind::Protocol));
        assert_eq!(ended.response.unwrap().text(), Some("4"));
    }

    #[test]
    fn start_hook_context_is_kept() {
        let tracker =
            CallTracker::start(Some(Arc::new(TracingHook)), None, CallContext::new(), info()).unwrap();
        assert!(tracker.context().correlation_id().is_some());
        tracker.succeed(response(None)).unwrap();
    }

    #[test]
    fn closures_are_usage_listeners() {
        let totals = Mutex::new(Vec::new());
        let listener = |_: &str, usage: &Usage| totals.lock().unwrap().push(usage.total_tokens);
        listener.on_usage("m", &Usage::new(2, 2));
        assert_eq!(*totals.lock().unwrap(), vec![4]);
    }
}
