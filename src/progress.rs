use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::{PipelineOutcome, RunStage};

/// Receives percentage-complete notifications from the supervisor.
///
/// Called from the task that drives the solver, never from the consumer's
/// own context; a UI must hand the value over to its own thread.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

/// Notifications a frontend receives for one run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Stage(RunStage),
    Progress(u8),
    Finished(PipelineOutcome),
    Failed(String),
}

/// Forwards progress into a run event channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, percent: u8) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.tx.send(RunEvent::Progress(percent));
    }
}

/// Percentage of `consumed` lines out of `total`, rounded and clamped to 0..=100.
pub fn percent(consumed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * consumed as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Line-count progress with duplicate suppression (the run's ProgressState).
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    previous: u8,
    last: u8,
}

impl ProgressTracker {
    pub fn new(total_statements: usize) -> Self {
        Self {
            total: total_statements,
            previous: 0,
            last: 0,
        }
    }

    /// Returns the new percentage when it differs from the last notification.
    pub fn observe(&mut self, lines_consumed: usize) -> Option<u8> {
        let pct = percent(lines_consumed, self.total);
        if pct > self.last {
            self.previous = self.last;
            self.last = pct;
            Some(pct)
        } else {
            None
        }
    }

    /// Terminal value for a successful run.
    pub fn finish(&mut self) -> Option<u8> {
        if self.last < 100 {
            self.previous = self.last;
            self.last = 100;
            Some(100)
        } else {
            None
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn previous(&self) -> u8 {
        self.previous
    }
}

/// Cooperative cancellation for an in-flight solver run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
