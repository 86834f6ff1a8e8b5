//! Upload state machine.
//!
//! One session uploads one file: handshake, chunked upload, save, start
//! print. Any failure is terminal; there are no retries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use super::error::TransferError;
use super::events::{ProgressSink, TransferOutcome};
use super::link::DeviceLink;
use super::protocol::{
    CHUNK_ERROR_MARKER, CHUNK_SIZE, DEFAULT_PORT, RESP_CREATE_FILE, RESP_INIT, RESP_SAVE_FILE, RESP_START_PRINT,
    RESP_START_UPLOAD, create_file_command, encode_command, encode_frame, init_command, save_file_command,
    start_print_command, start_upload_command,
};

/// Session states. `Done`, `Failed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Initializing,
    StartingUpload,
    CreatingFile,
    SendingChunks,
    Finalizing,
    StartingPrint,
    Done,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Aborted)
    }
}

/// Command/response handshake steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Initializing,
    StartingUpload,
    CreatingFile,
    Finalizing,
    StartingPrint,
}

impl Step {
    /// Prefix a successful response must start with.
    pub fn expected_prefix(self) -> &'static str {
        match self {
            Self::Initializing => RESP_INIT,
            Self::StartingUpload => RESP_START_UPLOAD,
            Self::CreatingFile => RESP_CREATE_FILE,
            Self::Finalizing => RESP_SAVE_FILE,
            Self::StartingPrint => RESP_START_PRINT,
        }
    }

    /// Message for a response with the wrong prefix.
    pub fn failed_message(self) -> &'static str {
        match self {
            Self::Initializing => "Printer initialization failed.",
            Self::StartingUpload => "Start upload failed.",
            Self::CreatingFile => "Create file failed.",
            Self::Finalizing => "Saving file failed.",
            Self::StartingPrint => "Start print failed. Try to start it manually.",
        }
    }

    /// Message for an empty response.
    pub fn no_response_message(self) -> &'static str {
        match self {
            Self::Initializing => "Printer initialization error.",
            Self::StartingUpload => "Start upload error.",
            Self::CreatingFile => "Create file error.",
            Self::Finalizing => "Saving file error.",
            Self::StartingPrint => "Start print error. Try to start it manually.",
        }
    }

    fn state(self) -> SessionState {
        match self {
            Self::Initializing => SessionState::Initializing,
            Self::StartingUpload => SessionState::StartingUpload,
            Self::CreatingFile => SessionState::CreatingFile,
            Self::Finalizing => SessionState::Finalizing,
            Self::StartingPrint => SessionState::StartingPrint,
        }
    }
}

/// State shared between the worker and the foreground.
#[derive(Debug, Default)]
pub struct SessionControl {
    abort: AtomicBool,
    /// f64 bits of the last reported percentage.
    progress: AtomicU64,
}

impl SessionControl {
    /// Request cancellation; honoured at the next chunk boundary.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Last reported progress in percent.
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }

    fn set_progress(&self, percent: f64) {
        self.progress.store(percent.to_bits(), Ordering::Relaxed);
    }
}

/// Connection and timing parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    /// Pause between the last chunk and the save command.
    pub settle_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }
}

enum Completion {
    Done,
    Aborted,
}

/// A single upload to one printer.
pub struct TransferSession<'a> {
    host: String,
    file_name: String,
    payload: Vec<u8>,
    options: SessionOptions,
    control: &'a SessionControl,
    state: SessionState,
    chunks_sent: usize,
}

impl<'a> TransferSession<'a> {
    /// Create a session for an already filtered payload.
    pub fn new(
        host: &str,
        file_name: &str,
        payload: Vec<u8>,
        options: SessionOptions,
        control: &'a SessionControl,
    ) -> Self {
        Self {
            host: host.to_string(),
            file_name: file_name.to_string(),
            payload,
            options,
            control,
            state: SessionState::Idle,
            chunks_sent: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames acknowledged by the printer so far.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Run the session to a terminal state, reporting to `sink`.
    ///
    /// The connection is closed before `on_finished` is called.
    pub fn run(&mut self, sink: &mut dyn ProgressSink) -> TransferOutcome {
        let outcome = match self.execute(sink) {
            Ok(Completion::Done) => {
                self.transition(SessionState::Done);
                info!("Upload of {} finished, print started", self.file_name);
                TransferOutcome::Done
            }
            Ok(Completion::Aborted) => {
                sink.on_status("Aborting...");
                self.transition(SessionState::Aborted);
                info!("Upload of {} aborted after {} chunks", self.file_name, self.chunks_sent);
                TransferOutcome::Aborted
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                error!("Upload of {} failed: {e:?}", self.file_name);
                TransferOutcome::Failed(e.to_string())
            }
        };

        sink.on_status(&outcome.summary());
        sink.on_finished(&outcome);
        outcome
    }

    fn execute(&mut self, sink: &mut dyn ProgressSink) -> Result<Completion, TransferError> {
        if self.control.is_cancelled() {
            return Ok(Completion::Aborted);
        }

        self.transition(SessionState::Connecting);
        sink.on_status("Connecting...");
        let mut link = DeviceLink::connect(&self.host, self.options.port, self.options.connect_timeout)
            .map_err(TransferError::Connection)?;

        sink.on_status("Transferring...");
        self.handshake(&mut link, Step::Initializing, &init_command())?;
        self.handshake(&mut link, Step::StartingUpload, &start_upload_command())?;
        let create = create_file_command(self.payload.len(), &self.file_name);
        self.handshake(&mut link, Step::CreatingFile, &create)?;

        self.transition(SessionState::SendingChunks);
        if !self.send_chunks(&mut link, sink)? {
            return Ok(Completion::Aborted);
        }

        if !self.options.settle_delay.is_zero() {
            debug!("Waiting {:?} before saving", self.options.settle_delay);
            thread::sleep(self.options.settle_delay);
        }

        self.handshake(&mut link, Step::Finalizing, &save_file_command())?;
        self.handshake(&mut link, Step::StartingPrint, &start_print_command(&self.file_name))?;
        Ok(Completion::Done)
    }

    /// Send one command and check the response prefix.
    fn handshake(&mut self, link: &mut DeviceLink, step: Step, command: &str) -> Result<(), TransferError> {
        self.transition(step.state());

        let response = exchange(link, &encode_command(command));
        if response.is_empty() {
            return Err(TransferError::NoResponse { step });
        }
        if !response.starts_with(step.expected_prefix()) {
            error!("Unexpected response to {}: {response:?}", command.trim_end());
            return Err(TransferError::Protocol { step, response });
        }
        Ok(())
    }

    /// Upload the payload in 4096-byte frames.
    ///
    /// Returns `Ok(false)` when the transfer was cancelled.
    fn send_chunks(&mut self, link: &mut DeviceLink, sink: &mut dyn ProgressSink) -> Result<bool, TransferError> {
        let total = self.payload.len();
        let mut sent = 0usize;

        for (index, chunk) in self.payload.chunks(CHUNK_SIZE).enumerate() {
            if self.control.is_cancelled() {
                return Ok(false);
            }

            let index = index as u32;
            let response = exchange(link, &encode_frame(index, chunk));
            if response.is_empty() {
                return Err(TransferError::ChunkNoResponse { index });
            }
            if response.contains(CHUNK_ERROR_MARKER) {
                error!("Printer rejected part {index}: {response:?}");
                return Err(TransferError::Chunk { index, response });
            }

            sent += chunk.len();
            self.chunks_sent += 1;

            let percent = 100.0 * sent as f64 / total as f64;
            self.control.set_progress(percent);
            sink.on_progress(percent);
            debug!("Part {index} sent ({sent}/{total} bytes)");
        }

        Ok(!self.control.is_cancelled())
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

/// Exchange that logs transport faults and reports them as "no response".
fn exchange(link: &mut DeviceLink, request: &[u8]) -> String {
    match link.exchange(request) {
        Ok(response) => response,
        Err(e) => {
            error!("Exchange with {} failed: {e}", link.peer());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Aborted.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::SendingChunks.is_terminal());
    }

    #[test]
    fn test_init_prefix_accepts_full_response() {
        let response = "CMD M601 Received.\r\nControl Success.\r\n";
        assert!(response.starts_with(Step::Initializing.expected_prefix()));
    }

    #[test]
    fn test_control_progress() {
        let control = SessionControl::default();
        assert_eq!(control.progress(), 0.0);
        control.set_progress(42.5);
        assert_eq!(control.progress(), 42.5);

        assert!(!control.is_cancelled());
        control.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_cancel_before_connect_skips_network() {
        let control = SessionControl::default();
        control.cancel();

        // Port 1 on loopback would refuse; the session must not even try.
        let options = SessionOptions {
            port: 1,
            ..SessionOptions::default()
        };
        let mut session = TransferSession::new("127.0.0.1", "cube", b"G28\n".to_vec(), options, &control);
        let mut events = Vec::new();

        assert_eq!(session.run(&mut events), TransferOutcome::Aborted);
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.chunks_sent(), 0);
    }
}
