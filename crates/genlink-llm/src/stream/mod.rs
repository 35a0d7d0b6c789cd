//! Streaming: frame decoding, aggregation and the per-call producer

mod aggregator;
mod driver;
mod frame;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use aggregator::StreamAggregator;
pub(crate) use driver::{StreamCall, spawn, split_choices};
pub use frame::{DONE_SENTINEL, Frame, FrameDecoder, FrameDelta};

use crate::types::StreamEvent;

/// Events of one streaming call
///
/// Each item is one finalized choice; an error, if any, is the last item.
/// Dropping the stream cancels the producer and closes the call.
///
/// The most recently finished choice is delivered one step late: it is
/// released when the next choice finishes or the body ends, so usage that
/// providers send after the finish can be attached to it. Only that single
/// finished choice is held; text is never buffered past the current frame.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
    _guard: DropGuard,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent>, guard: DropGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Stream over events that are already known
    pub(crate) fn ready(events: Vec<StreamEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // The channel has room for every event
            let _ = tx.try_send(event);
        }
        Self::new(rx, CancellationToken::new().drop_guard())
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
