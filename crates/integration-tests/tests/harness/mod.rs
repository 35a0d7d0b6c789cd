//! Shared helpers for end-to-end tests

#![allow(dead_code)]

pub mod client;
pub mod recorder;
pub mod stalled;
pub mod sse;
