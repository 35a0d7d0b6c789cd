use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Well-known key for the call correlation id
pub const CORRELATION_ID: &str = "correlation_id";

/// Why a call stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The caller canceled the token
    Canceled,
    /// The call deadline elapsed
    DeadlineExceeded,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("call canceled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Runtime context for a single generation call
///
/// Cheap to clone. Carries the caller's cancellation signal, an optional
/// deadline, call-scoped values attached by lifecycle hooks, and an optional
/// API key that overrides the configured one.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<BTreeMap<String, Value>>,
    api_key: Option<SecretString>,
}

impl CallContext {
    /// Create a context with a fresh cancellation token and no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a call-scoped value, replacing any previous value under `key`
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    /// Override the configured API key for this call
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Look up a call-scoped value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Correlation id attached by a lifecycle hook, if any
    pub fn correlation_id(&self) -> Option<&str> {
        self.value(CORRELATION_ID).and_then(Value::as_str)
    }

    /// Attach a random correlation id unless one is already present
    #[must_use]
    pub fn ensure_correlation_id(self) -> Self {
        if self.correlation_id().is_some() {
            return self;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.with_value(CORRELATION_ID, id)
    }

    /// Per-call API key override
    pub const fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    /// Configured deadline
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Underlying cancellation token
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Derive a context whose token is canceled with this one but can also
    /// be canceled on its own
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            values: Arc::clone(&self.values),
            api_key: self.api_key.clone(),
        }
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current interrupt state without waiting
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            return Some(Interrupt::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the call is canceled or its deadline elapses
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.cancel.cancelled() => Interrupt::Canceled,
                () = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                Interrupt::Canceled
            }
        }
    }
}
