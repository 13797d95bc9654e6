//! Progress notification for query runs

use tokio::sync::mpsc;

/// A single notification emitted by a query run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Human readable status text
    Message(String),
    /// Completion percentage in `0..=100`
    Percent(u8),
}

/// Fire-and-forget sink for run progress.
///
/// Reporters must not block and cannot influence the run.
pub trait ProgressReporter: Send + Sync {
    fn message(&self, text: &str);

    fn progress(&self, percent: u8);
}

/// Forwards events into a tokio channel; a closed receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// A reporter together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn message(&self, text: &str) {
        let _ = self.tx.send(ProgressEvent::Message(text.to_string()));
    }

    fn progress(&self, percent: u8) {
        let _ = self.tx.send(ProgressEvent::Percent(percent.min(100)));
    }
}

/// Writes progress to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn message(&self, text: &str) {
        tracing::info!(target: "dicom_query::progress", "{}", text);
    }

    fn progress(&self, percent: u8) {
        tracing::debug!(target: "dicom_query::progress", "{}%", percent);
    }
}

/// Any `Fn(ProgressEvent)` closure is a reporter
impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn message(&self, text: &str) {
        self(ProgressEvent::Message(text.to_string()))
    }

    fn progress(&self, percent: u8) {
        self(ProgressEvent::Percent(percent.min(100)))
    }
}

/// Progress shown while series queries run: the loop spans 50..75, one slot
/// per study. `None` when there are no studies.
pub fn series_progress(index: usize, total: usize) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let ratio = 25.0_f32 / total as f32;
    Some((50.0 + ratio * index as f32) as u8)
}
