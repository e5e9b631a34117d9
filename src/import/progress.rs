//! Progress reporting and cooperative cancellation for imports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where an import stands when a progress report is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// One progress report. Never stored; handed to a [`ProgressSink`] and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// 0..=100, never decreasing within one import.
    pub percentage: u8,
    pub message: String,
    pub stage: Stage,
}

/// Receives progress reports synchronously, in order, on the importing thread.
pub trait ProgressSink {
    fn report(&mut self, progress: &ImportProgress);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ImportProgress),
{
    fn report(&mut self, progress: &ImportProgress) {
        self(progress)
    }
}

/// Forwards reports into a tokio channel for async consumers.
pub struct ChannelSink(pub tokio::sync::mpsc::UnboundedSender<ImportProgress>);

impl ProgressSink for ChannelSink {
    fn report(&mut self, progress: &ImportProgress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.0.send(progress.clone());
    }
}

/// Discards every report.
pub struct Silent;

impl ProgressSink for Silent {
    fn report(&mut self, _progress: &ImportProgress) {}
}

/// A shared flag an importer polls between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Turns byte positions into step-aligned, monotone progress reports.
pub(crate) struct Tracker<'a> {
    sink: &'a mut dyn ProgressSink,
    total_bytes: u64,
    step: u8,
    last: u8,
    next_threshold: u8,
    steps_reported: u32,
}

impl<'a> Tracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, total_bytes: u64, step: u8) -> Self {
        let step = step.clamp(1, 100);
        Self {
            sink,
            total_bytes,
            step,
            last: 0,
            next_threshold: step,
            steps_reported: 0,
        }
    }

    pub(crate) fn start(&mut self, message: String) {
        self.emit(0, message, Stage::Running);
    }

    /// Report `consumed` bytes out of the total. Only emits when a new step
    /// below 100 has been crossed; 100 is reserved for the completion report.
    pub(crate) fn advance(&mut self, consumed: u64, records: u64) {
        let pct = self.percent_of(consumed);
        if pct < self.next_threshold || pct >= 100 {
            return;
        }
        let reached = pct - pct % self.step;
        self.next_threshold = reached.saturating_add(self.step);
        self.steps_reported += 1;
        let message = format!(
            "Processing step {} ({records} records)",
            self.steps_reported
        );
        self.emit(reached, message, Stage::Running);
    }

    pub(crate) fn complete(&mut self) {
        self.emit(100, "Import complete.".to_string(), Stage::Completed);
    }

    pub(crate) fn fail(&mut self, reason: &str) {
        let pct = self.last;
        self.emit(pct, format!("Import failed: {reason}"), Stage::Failed);
    }

    pub(crate) fn cancelled(&mut self) {
        let pct = self.last;
        self.emit(pct, "Import cancelled.".to_string(), Stage::Cancelled);
    }

    fn percent_of(&self, consumed: u64) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let consumed = consumed.min(self.total_bytes);
        ((consumed as u128 * 100) / self.total_bytes as u128) as u8
    }

    fn emit(&mut self, percentage: u8, message: String, stage: Stage) {
        let percentage = percentage.max(self.last);
        self.last = percentage;
        self.sink.report(&ImportProgress {
            percentage,
            message,
            stage,
        });
    }
}
