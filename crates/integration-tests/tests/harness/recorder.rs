//! Lifecycle hook and usage listener that remember what they saw

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use genlink_core::CallContext;
use genlink_llm::{CallHook, CallInfo, Usage, UsageListener};

#[derive(Debug, Default)]
pub struct Recorder {
    starts: AtomicUsize,
    ended: Mutex<Vec<CallInfo>>,
    usage: Mutex<Vec<Usage>>,
}

impl Recorder {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ended.lock().unwrap().len()
    }

    pub fn last_end(&self) -> CallInfo {
        self.ended.lock().unwrap().last().cloned().expect("call was ended")
    }

    pub fn usage_reports(&self) -> Vec<Usage> {
        self.usage.lock().unwrap().clone()
    }
}

impl CallHook for Recorder {
    fn on_call_start(&self, ctx: CallContext, _info: &CallInfo) -> anyhow::Result<CallContext> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(ctx.ensure_correlation_id())
    }

    fn on_call_end(&self, _ctx: &CallContext, info: &CallInfo) -> anyhow::Result<()> {
        self.ended.lock().unwrap().push(info.clone());
        Ok(())
    }
}

impl UsageListener for Recorder {
    fn on_usage(&self, _model: &str, usage: &Usage) {
        self.usage.lock().unwrap().push(*usage);
    }
}
