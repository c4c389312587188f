use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info};

/// Receiver of run progress. Called from the worker's hot loop, so
/// implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
    fn status(&self, message: String);
    fn done(&self, done: bool);
}

pub type CancelFlag = Arc<AtomicBool>;

pub(super) fn should_cancel(cancel_flag: &AtomicBool) -> bool {
    cancel_flag.load(Ordering::SeqCst)
}

pub(super) fn speed_mbps(bytes: u64, start_time: Instant) -> f64 {
    let elapsed = start_time.elapsed().as_secs_f64();
    if elapsed <= 0.0 {
        return 0.0;
    }
    (bytes as f64 / (1024.0 * 1024.0)) / elapsed
}

/// Forwards status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, percent: u8) {
        debug!(percent, "progress");
    }

    fn status(&self, message: String) {
        info!(target: "diskprobe::status", "{message}");
    }

    fn done(&self, done: bool) {
        debug!(done, "run signalled done");
    }
}

/// Delivers every notification to each wrapped sink, in order.
#[derive(Default, Clone)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanOutSink {
    fn report(&self, percent: u8) {
        for sink in &self.sinks {
            sink.report(percent);
        }
    }

    fn status(&self, message: String) {
        for sink in &self.sinks {
            sink.status(message.clone());
        }
    }

    fn done(&self, done: bool) {
        for sink in &self.sinks {
            sink.done(done);
        }
    }
}
