//! Shared primitives for genlink crates
//!
//! Holds the per-call context threaded through generation calls, lifecycle
//! hooks and transports.

mod context;

pub use context::{CORRELATION_ID, CallContext, Interrupt};
