use genlink_core::Interrupt;
use thiserror::Error;

/// Boxed error used as a source for transport and hook failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Maximum size of a body excerpt carried by an error
pub const SNIPPET_LIMIT: usize = 256;

/// Errors that can occur during a generation call
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection, timeout or body read failure
    #[error("transport error: {message}")]
    Transport {
        /// What failed
        message: String,
        /// Underlying I/O or HTTP client error
        #[source]
        source: Option<BoxError>,
    },

    /// Malformed or unrecognizable payload from the provider
    #[error("protocol error: {message}{}", snippet_suffix(.snippet))]
    Protocol {
        /// What could not be parsed
        message: String,
        /// Bounded excerpt of the offending body
        snippet: String,
        /// JSON decode failure, when that was the cause
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Structured error reported by the provider
    #[error("provider error{}: {message}", .status.map_or_else(String::new, |s| format!(" (status {s})")))]
    Provider {
        /// HTTP status, absent for errors delivered inside a stream
        status: Option<u16>,
        /// Provider message, verbatim
        message: String,
        /// Provider error type (e.g. "`invalid_request_error`")
        error_type: Option<String>,
        /// Provider error code
        code: Option<String>,
    },

    /// Provider rejected a continuation token or could not correlate a tool result
    #[error("continuation error: {message}")]
    Continuation {
        /// Provider or adapter message
        message: String,
        /// HTTP status when the provider rejected the call
        status: Option<u16>,
    },

    /// Caller requested a capability this client does not have
    #[error("feature not supported by this client: {feature}")]
    Unimplemented {
        /// Capability name
        feature: String,
    },

    /// Request cannot be represented for the target provider
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Call stopped by the caller's context
    #[error("{0}")]
    Canceled(Interrupt),

    /// Lifecycle hook returned an error
    #[error("lifecycle hook failed during {stage}: {message}")]
    Hook {
        /// Hook stage (`on_call_start`, `on_call_end`, `on_stream_delta`)
        stage: &'static str,
        /// Hook error message
        message: String,
    },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn snippet_suffix(snippet: &str) -> String {
    if snippet.is_empty() {
        String::new()
    } else {
        format!(" (body: {snippet})")
    }
}

/// Coarse error classification for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Protocol,
    Provider,
    Continuation,
    Unimplemented,
    InvalidRequest,
    Canceled,
    Hook,
    Internal,
}

impl LlmError {
    /// Transport failure with an underlying cause
    pub fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Protocol failure carrying a bounded excerpt of `body`
    pub fn protocol(message: impl Into<String>, body: &[u8]) -> Self {
        Self::Protocol {
            message: message.into(),
            snippet: snippet(body),
            source: None,
        }
    }

    /// Protocol failure caused by a JSON decode error
    pub fn malformed_json(message: impl Into<String>, body: &[u8], source: serde_json::Error) -> Self {
        Self::Protocol {
            message: message.into(),
            snippet: snippet(body),
            source: Some(source),
        }
    }

    /// Provider error without a type or code
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
            error_type: None,
            code: None,
        }
    }

    /// Lifecycle hook failure
    pub fn hook(stage: &'static str, error: &anyhow::Error) -> Self {
        Self::Hook {
            stage,
            message: format!("{error:#}"),
        }
    }

    /// Classify this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Continuation { .. } => ErrorKind::Continuation,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Canceled(_) => ErrorKind::Canceled,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status reported by the provider, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } | Self::Continuation { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether an external retry policy may reasonably try again
    ///
    /// Continuation errors are never retryable: repeating the call without
    /// the rejected token silently changes conversation semantics.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Provider { status, .. } => status.is_some_and(|s| s == 408 || s == 429 || s >= 500),
            _ => false,
        }
    }

    /// Whether the provider refused to stream this call
    ///
    /// Used to decide if the one-shot non-streaming fallback applies.
    pub fn is_streaming_unsupported(&self) -> bool {
        let Self::Provider {
            status, message, code, ..
        } = self
        else {
            return false;
        };

        if matches!(status, Some(405 | 501)) {
            return true;
        }

        if code
            .as_deref()
            .is_some_and(|c| matches!(c, "streaming_not_supported" | "stream_not_supported" | "unsupported_stream"))
        {
            return true;
        }

        let message = message.to_ascii_lowercase();
        message.contains("stream") && (message.contains("not supported") || message.contains("unsupported"))
    }
}

/// Bounded, char-boundary-safe excerpt of a body
pub fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.len() <= SNIPPET_LIMIT {
        return text.to_owned();
    }

    let mut end = SNIPPET_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}
