//! Upload service: runs a transfer session on a background worker.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::finder::{
    ProgressSink, SessionControl, SessionOptions, TransferEvent, TransferOutcome, TransferSession, filter_lines,
};

/// Everything needed for one upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Raw G-code; comments and blank lines are stripped before sending.
    pub instruction_text: String,
    /// Printer host name or IP address.
    pub address: String,
    /// Name of the file on the printer (without extension).
    pub file_name: String,
}

/// Starts uploads to a printer, one at a time.
pub struct Uploader {
    options: SessionOptions,
    active: Weak<SessionControl>,
}

impl Uploader {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            active: Weak::new(),
        }
    }

    /// Create an uploader using the device and transfer settings.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.session_options())
    }

    /// Whether a handle from a previous `start` is still alive.
    pub fn is_busy(&self) -> bool {
        self.active.strong_count() > 0
    }

    /// Start an upload on a blocking worker.
    ///
    /// Runs on the current tokio runtime.
    ///
    /// # Errors
    /// `Busy` while an earlier transfer's handle (or its worker) is alive,
    /// `InvalidRequest` when the file name or address is empty, `Worker`
    /// when called outside a tokio runtime.
    pub fn start(&mut self, request: UploadRequest) -> Result<TransferHandle> {
        if self.is_busy() {
            return Err(AppError::Busy);
        }
        if request.file_name.trim().is_empty() {
            return Err(AppError::invalid_request("File name is required"));
        }
        if request.address.trim().is_empty() {
            return Err(AppError::invalid_request("Printer address is required"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Worker(format!("No tokio runtime to run the transfer: {e}")))?;

        let control = Arc::new(SessionControl::default());
        self.active = Arc::downgrade(&control);

        let (tx, rx) = mpsc::unbounded_channel();
        let worker_control = Arc::clone(&control);
        let options = self.options.clone();

        let task = runtime.spawn_blocking(move || {
            let mut sink = tx;
            let payload = filter_lines(&request.instruction_text);
            info!(
                "Uploading {} ({} bytes) to {}:{}",
                request.file_name,
                payload.len(),
                request.address.trim(),
                options.port
            );

            let mut session = TransferSession::new(
                request.address.trim(),
                &request.file_name,
                payload,
                options,
                &worker_control,
            );
            session.run(&mut sink)
        });

        Ok(TransferHandle {
            control,
            events: rx,
            task,
        })
    }
}

/// Foreground side of a running transfer.
///
/// While the handle exists its uploader refuses new transfers.
pub struct TransferHandle {
    control: Arc<SessionControl>,
    events: mpsc::UnboundedReceiver<TransferEvent>,
    task: JoinHandle<TransferOutcome>,
}

impl TransferHandle {
    /// Request cancellation at the next chunk boundary.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Last reported progress in percent.
    pub fn progress(&self) -> f64 {
        self.control.progress()
    }

    /// A detached cancel trigger, e.g. for a signal handler.
    ///
    /// It does not keep the uploader busy.
    pub fn canceller(&self) -> Canceller {
        Canceller(Arc::downgrade(&self.control))
    }

    /// Next event; `None` once the worker has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Deliver all remaining events to `sink`.
    pub async fn forward_to(&mut self, sink: &mut dyn ProgressSink) {
        while let Some(event) = self.events.recv().await {
            match event {
                TransferEvent::Status(text) => sink.on_status(&text),
                TransferEvent::Progress(percent) => sink.on_progress(percent),
                TransferEvent::Finished(outcome) => sink.on_finished(&outcome),
            }
        }
    }

    /// Wait for the worker and return the outcome.
    pub async fn wait(self) -> Result<TransferOutcome> {
        self.task
            .await
            .map_err(|e| AppError::Worker(format!("Task join error: {e}")))
    }
}

/// Cancels a transfer without holding it alive.
#[derive(Debug, Clone)]
pub struct Canceller(Weak<SessionControl>);

impl Canceller {
    pub fn cancel(&self) {
        if let Some(control) = self.0.upgrade() {
            control.cancel();
        }
    }
}
