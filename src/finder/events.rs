//! Progress events emitted by a transfer.

use serde::Serialize;
use tokio::sync::mpsc;

/// How a transfer ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// File uploaded and print started.
    Done,
    /// Transfer stopped at a failing step.
    Failed(String),
    /// Cancelled by the user.
    Aborted,
}

impl TransferOutcome {
    /// Short description for status displays.
    pub fn summary(&self) -> String {
        match self {
            Self::Done => "Upload complete, print started.".to_string(),
            Self::Failed(message) => message.clone(),
            Self::Aborted => "Transfer aborted.".to_string(),
        }
    }
}

/// Event sent from the transfer worker to the foreground.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum TransferEvent {
    Status(String),
    /// Percentage of payload bytes acknowledged, 0..=100.
    Progress(f64),
    Finished(TransferOutcome),
}

/// Receiver of transfer updates.
///
/// Calls are fire-and-forget; implementations must not block the worker.
pub trait ProgressSink {
    fn on_status(&mut self, text: &str);
    fn on_progress(&mut self, percent: f64);
    fn on_finished(&mut self, outcome: &TransferOutcome);
}

impl ProgressSink for mpsc::UnboundedSender<TransferEvent> {
    fn on_status(&mut self, text: &str) {
        let _ = self.send(TransferEvent::Status(text.to_string()));
    }

    fn on_progress(&mut self, percent: f64) {
        let _ = self.send(TransferEvent::Progress(percent));
    }

    fn on_finished(&mut self, outcome: &TransferOutcome) {
        let _ = self.send(TransferEvent::Finished(outcome.clone()));
    }
}

/// Sink that records every event, in order.
impl ProgressSink for Vec<TransferEvent> {
    fn on_status(&mut self, text: &str) {
        self.push(TransferEvent::Status(text.to_string()));
    }

    fn on_progress(&mut self, percent: f64) {
        self.push(TransferEvent::Progress(percent));
    }

    fn on_finished(&mut self, outcome: &TransferOutcome) {
        self.push(TransferEvent::Finished(outcome.clone()));
    }
}
