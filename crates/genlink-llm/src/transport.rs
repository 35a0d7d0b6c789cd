//! HTTP boundary between the client and a provider

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};
use genlink_core::CallContext;
use http::HeaderMap;
use reqwest::Client;
use url::Url;

use crate::error::LlmError;

/// Response body as a stream of chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Fully built provider request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Endpoint URL
    pub url: Url,
    /// Auth, content type and configured extra headers
    pub headers: HeaderMap,
    /// JSON body
    pub body: Bytes,
    /// Whether the caller expects an event stream back
    pub stream: bool,
    /// Request timeout for non-streaming calls
    pub timeout: Option<Duration>,
}

/// Provider response with an unread body
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Body chunks
    pub body: ByteStream,
}

impl TransportResponse {
    /// Response with a body that is already in memory
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            headers: HeaderMap::new(),
            body: Box::pin(futures_util::stream::iter([Ok(body)])),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Read the whole body
    pub async fn bytes(self) -> Result<Bytes, LlmError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        let mut body = BytesMut::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends provider requests
///
/// Implementations only move bytes: status handling, parsing and retries
/// belong to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return once response headers arrive
    async fn send(&self, ctx: &CallContext, request: TransportRequest) -> Result<TransportResponse, LlmError>;
}

/// Default transport backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, pools)
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, _ctx: &CallContext, request: TransportRequest) -> Result<TransportResponse, LlmError> {
        let mut builder = self
            .client
            .post(request.url.clone())
            .headers(request.headers)
            .body(request.body);

        // A total timeout would cut long streams short
        if let Some(timeout) = request.timeout.filter(|_| !request.stream) {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(url = %request.url, error = %e, "upstream request failed");
            LlmError::transport("upstream request failed", e)
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::transport("failed to read response body", e)));

        Ok(TransportResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
