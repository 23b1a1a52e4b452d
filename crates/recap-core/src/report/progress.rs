//! Per-run progress. The experiment runner emits done/total in completion
//! order; the console layer consumes it through a sink.

use std::sync::Arc;

/// How many videos of the current run are done, out of how many.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Called once per finished video. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
