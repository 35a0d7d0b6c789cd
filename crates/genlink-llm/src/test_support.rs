//! Test doubles shared by unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use genlink_core::CallContext;
use http::HeaderMap;

use crate::error::LlmError;
use crate::lifecycle::{CallHook, CallInfo};
use crate::transport::{ByteStream, Transport, TransportRequest, TransportResponse};

/// Split `body` into `size`-byte chunks
pub fn chunked(body: &str, size: usize) -> ByteStream {
    let chunks: Vec<Result<Bytes, LlmError>> = body
        .as_bytes()
        .chunks(size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

/// Hook that counts calls and keeps every end record
#[derive(Debug, Default)]
pub struct RecordingHook {
    fail_start: bool,
    fail_end: bool,
    starts: AtomicUsize,
    deltas: AtomicUsize,
    ended: Mutex<Vec<CallInfo>>,
}

impl RecordingHook {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn failing_end() -> Self {
        Self {
            fail_end: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ended.lock().unwrap().len()
    }

    pub fn deltas(&self) -> usize {
        self.deltas.load(Ordering::SeqCst)
    }

    pub fn last_end(&self) -> Option<CallInfo> {
        self.ended.lock().unwrap().last().cloned()
    }
}

impl CallHook for RecordingHook {
    fn on_call_start(&self, ctx: CallContext, _info: &CallInfo) -> anyhow::Result<CallContext> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("start rejected");
        }
        Ok(ctx.with_value("hook", "recording"))
    }

    fn on_call_end(&self, _ctx: &CallContext, info: &CallInfo) -> anyhow::Result<()> {
        self.ended.lock().unwrap().push(info.clone());
        if self.fail_end {
            anyhow::bail!("end rejected");
        }
        Ok(())
    }

    fn on_stream_delta(&self, _ctx: &CallContext, _frame: &[u8]) -> anyhow::Result<()> {
        self.deltas.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One scripted transport outcome
pub enum Scripted {
    /// Respond with `status` and the body split into chunks
    Respond { status: u16, chunks: Vec<String> },
    /// Fail before any response arrives
    Fail(String),
}

impl Scripted {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            chunks: vec![body.into()],
        }
    }

    pub fn events(chunks: &[&str]) -> Self {
        Self::Respond {
            status: 200,
            chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
        }
    }
}

/// In-memory transport replaying queued outcomes in order
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Bodies of the recorded requests as JSON
    pub fn request_bodies(&self) -> Vec<serde_json::Value> {
        self.requests()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _ctx: &CallContext, request: TransportRequest) -> Result<TransportResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond { status, chunks }) => {
                let chunks: Vec<Result<Bytes, LlmError>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                Ok(TransportResponse {
                    status,
                    headers: HeaderMap::new(),
                    body: Box::pin(futures_util::stream::iter(chunks)),
                })
            }
            Some(Scripted::Fail(message)) => Err(LlmError::Transport { message, source: None }),
            None => panic!("transport script exhausted"),
        }
    }
}
