// src/commit/progress.rs

//! Progress reporting while changes are applied

use crate::changeset::Stats;
use tracing::{trace, warn};

/// Receives `done`/`total` progress updates
pub trait ProgressSink {
    fn update(&mut self, done: u64, total: u64);
}

/// Writes progress to the trace log
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&mut self, done: u64, total: u64) {
        trace!("progress {}/{}", done, total);
    }
}

/// Progress state for one commit
///
/// Work is measured as installed bytes plus package operations. Updates
/// never go backwards, even when an installer reports fewer bytes than an
/// earlier call did.
pub struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    pub done: Stats,
    pub total: Stats,
    last: u64,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, total: Stats) -> Self {
        Self {
            sink,
            done: Stats::default(),
            total,
            last: 0,
        }
    }

    /// Report progress with `installed_bytes` of the current change done
    pub fn report(&mut self, installed_bytes: u64) {
        let total = self.total.weight();
        let done = (self.done.weight() + installed_bytes).min(total).max(self.last);
        self.last = done;
        self.sink.update(done, total);
    }

    /// Report completion with the work actually accounted for
    ///
    /// Equals `(total, total)` when every change was counted.
    pub fn finish(&mut self) {
        let total = self.total.weight();
        if self.done != self.total {
            warn!("progress accounted {:?} of {:?}", self.done, self.total);
        }
        let done = self.done.weight().max(self.last);
        self.last = done;
        self.sink.update(done, total);
    }

    /// Digits needed to print the total number of changes
    pub fn counter_width(&self) -> usize {
        self.total.changes.max(1).to_string().len()
    }
}
