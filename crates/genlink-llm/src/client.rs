//! Generation client: one configured provider and model
//!
//! Every call runs the same pipeline. The capability check and request
//! encoding happen before the call is announced to the lifecycle hook, so a
//! rejected request never produces hook traffic. From the start hook on,
//! the call is owned by a [`CallTracker`] that closes it exactly once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use genlink_config::{ClientConfig, GenerationDefaults};
use genlink_core::CallContext;
use http::HeaderMap;
use http::header::{ACCEPT, HeaderName, HeaderValue};
use secrecy::SecretString;
use url::Url;

use crate::capability::{Capabilities, Feature};
use crate::convert::{PreparedRequest, error_from_body};
use crate::error::{ErrorKind, LlmError};
use crate::lifecycle::{CallHook, CallInfo, CallKind, CallTracker, UsageListener};
use crate::parse;
use crate::provider::Provider;
use crate::session::{SessionStore, SessionUpdate};
use crate::stream::{self, EventStream, StreamCall};
use crate::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
use crate::types::{GenerateRequest, GenerateResponse};

/// Client for one configured provider and model
pub struct GenerationClient {
    provider: Provider,
    model: String,
    base_url: Url,
    api_key: Option<SecretString>,
    headers: HeaderMap,
    defaults: GenerationDefaults,
    max_output_tokens: Option<u32>,
    stream_fallback: bool,
    continuation: bool,
    timeout: Option<Duration>,
    capabilities: Capabilities,
    sessions: SessionStore,
    transport: Arc<dyn Transport>,
    hook: Option<Arc<dyn CallHook>>,
    usage_listener: Option<Arc<dyn UsageListener>>,
}

/// Builder for [`GenerationClient`]
pub struct GenerationClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    hook: Option<Arc<dyn CallHook>>,
    usage_listener: Option<Arc<dyn UsageListener>>,
    sessions: Option<SessionStore>,
}

impl GenerationClientBuilder {
    /// Send requests through `transport` instead of the default `reqwest` one
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn CallHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn usage_listener(mut self, listener: Arc<dyn UsageListener>) -> Self {
        self.usage_listener = Some(listener);
        self
    }

    /// Use an existing session store, e.g. one shared with another client
    #[must_use]
    pub fn sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration carries an invalid duration,
    /// header or feature name.
    pub fn build(self) -> Result<GenerationClient, LlmError> {
        let config = self.config;
        let provider = Provider::from(config.provider_type);
        let timeout = config.timeout()?;

        let base_url = match config.base_url {
            Some(url) => url,
            None => Url::parse(provider.default_base_url())
                .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid default base URL: {e}")))?,
        };

        let capabilities = Capabilities::detect(provider, &config.model).without(&config.disabled_features)?;
        let sessions = match self.sessions {
            Some(sessions) => sessions,
            None => SessionStore::from_config(&config.continuation)?,
        };

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid value for header '{name}': {e}")))?;
            headers.insert(header, value);
        }

        tracing::debug!(
            provider = provider.name(),
            model = %config.model,
            base_url = %base_url,
            features = ?capabilities.iter().collect::<Vec<_>>(),
            "generation client ready"
        );

        Ok(GenerationClient {
            provider,
            model: config.model,
            base_url,
            api_key: config.api_key,
            headers,
            defaults: config.defaults,
            max_output_tokens: config.max_output_tokens,
            stream_fallback: config.stream_fallback,
            continuation: config.continuation.enabled,
            timeout,
            capabilities,
            sessions,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            hook: self.hook,
            usage_listener: self.usage_listener,
        })
    }
}

impl GenerationClient {
    pub fn builder(config: ClientConfig) -> GenerationClientBuilder {
        GenerationClientBuilder {
            config,
            transport: None,
            hook: None,
            usage_listener: None,
            sessions: None,
        }
    }

    /// Client with the default transport and no observers
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::builder(config).build()
    }

    pub const fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Whether this client supports the named feature
    ///
    /// Unknown names are unsupported.
    pub fn implements(&self, name: &str) -> bool {
        self.capabilities.implements(name)
    }

    /// Run one non-streaming generation call
    ///
    /// A rejected continuation is retried once without the token when the
    /// caller set `allow_fresh_restart`; the retry is a separate call.
    pub async fn generate(&self, ctx: &CallContext, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.capabilities.require_for(request, false)?;
        let token = self.continuation_token(request);

        let result = self.generate_once(ctx, request, token.as_deref()).await;
        match result {
            Err(e)
                if e.kind() == ErrorKind::Continuation && token.is_some() && request.options().allow_fresh_restart =>
            {
                tracing::warn!(
                    provider = self.provider.name(),
                    model = %self.model,
                    error = %e,
                    "continuation rejected, restarting without it"
                );
                self.generate_once(ctx, request, None).await
            }
            other => other,
        }
    }

    /// Start a streaming generation call
    ///
    /// Errors before the provider accepts the stream are returned directly;
    /// later failures arrive as the last item of the stream. If the provider
    /// refuses to stream and fallback is allowed, the call is served by one
    /// non-streaming request and every event carries `fallback = true`.
    pub async fn stream(&self, ctx: &CallContext, request: &GenerateRequest) -> Result<EventStream, LlmError> {
        self.capabilities.require_for(request, true)?;
        let token = self.continuation_token(request);

        let body = self.encode(request, token.as_deref(), true)?;
        let outgoing = self.transport_request(ctx, body.clone(), true)?;
        let session = self.session_update(request);

        let info = CallInfo::new(self.provider.name(), self.model.clone(), CallKind::Stream, body);
        let mut tracker = CallTracker::start(self.hook.clone(), self.usage_listener.clone(), ctx.clone(), info)?;
        let call_ctx = tracker.context().clone();

        let response = match self.send(&call_ctx, outgoing).await {
            Ok(response) => response,
            Err(e) => return Err(close_failed(tracker, session.as_ref(), e)),
        };

        if !response.is_success() {
            let status = response.status;
            let error = match read_body(&call_ctx, response).await {
                Ok(body) => {
                    tracker.record_response_json(body.clone());
                    error_from_body(status, &body)
                }
                Err(e) => e,
            };

            if error.is_streaming_unsupported() && self.stream_fallback && !request.options().disable_stream_fallback {
                tracing::warn!(
                    provider = self.provider.name(),
                    model = %self.model,
                    status,
                    error = %error,
                    "provider refused to stream, falling back to a single response"
                );
                return self
                    .fall_back(&call_ctx, tracker, session, request, token.as_deref())
                    .await;
            }

            tracing::warn!(provider = self.provider.name(), status, error = %error, "upstream returned error");
            return Err(close_failed(tracker, session.as_ref(), error));
        }

        Ok(stream::spawn(
            StreamCall {
                provider: self.provider,
                tracker,
                session,
            },
            response.body,
        ))
    }

    async fn generate_once(
        &self,
        ctx: &CallContext,
        request: &GenerateRequest,
        token: Option<&str>,
    ) -> Result<GenerateResponse, LlmError> {
        let body = self.encode(request, token, false)?;
        let outgoing = self.transport_request(ctx, body.clone(), false)?;
        let session = self.session_update(request);

        let info = CallInfo::new(self.provider.name(), self.model.clone(), CallKind::Generate, body);
        let mut tracker = CallTracker::start(self.hook.clone(), self.usage_listener.clone(), ctx.clone(), info)?;
        let call_ctx = tracker.context().clone();

        match self.round_trip(&call_ctx, outgoing, &mut tracker).await {
            Ok(response) => close_succeeded(tracker, session.as_ref(), response),
            Err(e) => Err(close_failed(tracker, session.as_ref(), e)),
        }
    }

    /// Serve a refused stream with one non-streaming request
    async fn fall_back(
        &self,
        ctx: &CallContext,
        mut tracker: CallTracker,
        session: Option<SessionUpdate>,
        request: &GenerateRequest,
        token: Option<&str>,
    ) -> Result<EventStream, LlmError> {
        tracker.mark_fallback();

        let outgoing = self.encode(request, token, false).and_then(|body| {
            tracker.record_request_json(body.clone());
            self.transport_request(ctx, body, false)
        });
        let result = match outgoing {
            Ok(outgoing) => self.round_trip(ctx, outgoing, &mut tracker).await,
            Err(e) => Err(e),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(e) => return Err(close_failed(tracker, session.as_ref(), e)),
        };
        response.fallback = true;

        let response = close_succeeded(tracker, session.as_ref(), response)?;
        Ok(EventStream::ready(
            stream::split_choices(response).into_iter().map(Ok).collect(),
        ))
    }

    /// Send a non-streaming request and parse the reply
    async fn round_trip(
        &self,
        ctx: &CallContext,
        outgoing: TransportRequest,
        tracker: &mut CallTracker,
    ) -> Result<GenerateResponse, LlmError> {
        let response = self.send(ctx, outgoing).await?;
        let status = response.status;
        let success = response.is_success();
        let body = read_body(ctx, response).await?;
        tracker.record_response_json(body.clone());

        if !success {
            let error = error_from_body(status, &body);
            tracing::warn!(provider = self.provider.name(), status, error = %error, "upstream returned error");
            return Err(error);
        }

        parse::parse_body(self.provider, &body)
    }

    /// Dispatch through the transport, racing the call's cancellation
    async fn send(&self, ctx: &CallContext, outgoing: TransportRequest) -> Result<TransportResponse, LlmError> {
        tokio::select! {
            biased;
            interrupt = ctx.done() => Err(LlmError::Canceled(interrupt)),
            response = self.transport.send(ctx, outgoing) => response,
        }
    }

    fn encode(&self, request: &GenerateRequest, token: Option<&str>, stream: bool) -> Result<Bytes, LlmError> {
        let prepared = PreparedRequest::new(&self.model, request)
            .with_defaults(&self.defaults)
            .with_provider_max_tokens(self.provider.default_max_tokens())
            .clamp_max_tokens(self.max_output_tokens)
            .with_continuation(token)
            .streaming(stream);
        prepared.require_model()?;
        self.provider.to_wire(&prepared)
    }

    fn transport_request(&self, ctx: &CallContext, body: Bytes, stream: bool) -> Result<TransportRequest, LlmError> {
        let url = self.provider.endpoint(&self.base_url, &self.model, stream)?;

        let mut headers = self.headers.clone();
        let api_key = ctx.api_key().or(self.api_key.as_ref());
        self.provider.request_headers(api_key, &mut headers)?;
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }

        Ok(TransportRequest {
            url,
            headers,
            body,
            stream,
            timeout: self.timeout,
        })
    }

    fn supports_continuation(&self) -> bool {
        self.continuation && self.capabilities.supports(Feature::SupportsSessionContinuation)
    }

    /// Token to send: the caller's, else the one remembered for the conversation
    fn continuation_token(&self, request: &GenerateRequest) -> Option<String> {
        let options = request.options();
        let explicit = options.continuation_token.as_deref().filter(|t| !t.is_empty());
        if explicit.is_none() && options.conversation_id.is_none() {
            return None;
        }

        if !self.supports_continuation() {
            tracing::debug!(
                provider = self.provider.name(),
                model = %self.model,
                "continuation not available, sending the full conversation"
            );
            return None;
        }

        explicit.map(ToOwned::to_owned).or_else(|| {
            options
                .conversation_id
                .as_deref()
                .and_then(|id| self.sessions.get(id))
        })
    }

    fn session_update(&self, request: &GenerateRequest) -> Option<SessionUpdate> {
        if !self.supports_continuation() {
            return None;
        }
        let conversation_id = request.options.as_ref()?.conversation_id.clone()?;
        Some(SessionUpdate {
            store: self.sessions.clone(),
            conversation_id,
        })
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Read a whole body, racing the call's cancellation
async fn read_body(ctx: &CallContext, response: TransportResponse) -> Result<Bytes, LlmError> {
    tokio::select! {
        biased;
        interrupt = ctx.done() => Err(LlmError::Canceled(interrupt)),
        body = response.bytes() => body,
    }
}

fn close_succeeded(
    tracker: CallTracker,
    session: Option<&SessionUpdate>,
    response: GenerateResponse,
) -> Result<GenerateResponse, LlmError> {
    if let Some(session) = session {
        session.remember(response.id.as_deref());
    }
    tracker.succeed(response.clone())?;
    Ok(response)
}

/// End a failed call and hand back its error
fn close_failed(tracker: CallTracker, session: Option<&SessionUpdate>, error: LlmError) -> LlmError {
    if let (ErrorKind::Continuation, Some(session)) = (error.kind(), session) {
        session.forget();
    }
    if let Err(end) = tracker.fail(&error, None) {
        tracing::warn!(error = %end, "end hook failed");
    }
    error
}
