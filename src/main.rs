//! finder-send - upload G-code to a FlashForge Finder and start the print.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use finder_send as app;

use app::config::{AppConfig, ConfigLoadResult};
use app::finder::protocol::{CHUNK_SIZE, chunk_count, device_path};
use app::finder::{ProgressSink, TransferEvent, TransferOutcome, filter_lines, normalize_line_endings};
use app::{UploadRequest, Uploader};

/// Upload G-code to a FlashForge Finder over the network.
#[derive(Parser)]
#[command(name = "finder-send", version)]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a G-code file and start printing it
    Send {
        /// G-code file to upload
        file: PathBuf,
        /// Printer host name or IP address (overrides config)
        #[arg(long, short)]
        address: Option<String>,
        /// Printer TCP port (overrides config)
        #[arg(long, short)]
        port: Option<u16>,
        /// File name on the printer (default: file stem)
        #[arg(long, short)]
        name: Option<String>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show what would be uploaded without connecting
    Filter {
        /// G-code file to inspect
        file: PathBuf,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = if let Some(path) = cli.config.clone() {
        path
    } else if cli.dev {
        PathBuf::from("config.toml")
    } else {
        AppConfig::default_path()
    };

    let (config, config_problem) = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => (config, None),
        ConfigLoadResult::Missing => (AppConfig::default(), None),
        ConfigLoadResult::Invalid(e) => (AppConfig::default(), Some(e)),
    };

    // Initialize logging
    let _guard = app::logging::init(&config.logging).context("Failed to open log file")?;
    tracing::info!("Config path: {:?}", config_path);

    if let Some(e) = config_problem {
        if !matches!(cli.command, Command::Config { .. }) {
            bail!("Invalid config {}: {e}", config_path.display());
        }
        tracing::warn!("Config invalid: {}", e);
    }

    match cli.command {
        Command::Send {
            file,
            address,
            port,
            name,
            json,
        } => send(config, &file, address, port, name, json),
        Command::Filter { file } => {
            let payload = filter_lines(&read_gcode(&file)?);
            std::io::stdout().write_all(&payload)?;
            eprintln!("{} bytes, {} chunks of {CHUNK_SIZE}", payload.len(), chunk_count(payload.len()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", config_path.display());
                }
                AppConfig::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn send(
    mut config: AppConfig,
    file: &Path,
    address: Option<String>,
    port: Option<u16>,
    name: Option<String>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    if let Some(address) = address {
        config.device.address = address;
    }
    if let Some(port) = port {
        config.device.port = port;
    }
    config.validate()?;
    if config.device.address.is_empty() {
        bail!("No printer address: pass --address or set device.address in the config file");
    }

    let file_name = match name {
        Some(name) => name,
        None => file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Cannot derive a file name, use --name")?,
    };

    let request = UploadRequest {
        instruction_text: read_gcode(file)?,
        address: config.device.address.clone(),
        file_name,
    };
    tracing::info!(
        "Sending {} to {}:{} as {}",
        file.display(),
        request.address,
        config.device.port,
        device_path(&request.file_name)
    );

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let outcome = rt.block_on(async {
        let mut uploader = Uploader::from_config(&config);
        let mut handle = uploader.start(request)?;

        let canceller = handle.canceller();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                canceller.cancel();
            }
        });

        if json {
            handle.forward_to(&mut JsonSink).await;
        } else {
            handle.forward_to(&mut ConsoleSink::default()).await;
        }
        handle.wait().await
    })?;

    let code = match outcome {
        TransferOutcome::Done => ExitCode::SUCCESS,
        TransferOutcome::Failed(_) => ExitCode::FAILURE,
        TransferOutcome::Aborted => ExitCode::from(130),
    };
    Ok(code)
}

fn read_gcode(path: &Path) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(normalize_line_endings(&text))
}

/// Human-readable progress on the terminal.
#[derive(Default)]
struct ConsoleSink {
    last_percent: Option<u32>,
}

impl ProgressSink for ConsoleSink {
    fn on_status(&mut self, text: &str) {
        if self.last_percent.take().is_some() {
            eprintln!();
        }
        eprintln!("{text}");
    }

    fn on_progress(&mut self, percent: f64) {
        let whole = percent.floor() as u32;
        if self.last_percent != Some(whole) {
            self.last_percent = Some(whole);
            eprint!("\r  {whole:3}%");
        }
    }

    fn on_finished(&mut self, outcome: &TransferOutcome) {
        if self.last_percent.take().is_some() {
            eprintln!();
        }
        let when = Local::now().format("%Y-%m-%d %H:%M:%S");
        match outcome {
            TransferOutcome::Done => println!("Done at {when}."),
            TransferOutcome::Failed(message) => println!("Failed at {when}: {message}"),
            TransferOutcome::Aborted => println!("Aborted at {when}."),
        }
    }
}

/// One JSON object per event on stdout.
struct JsonSink;

impl JsonSink {
    fn emit(&self, event: TransferEvent) {
        match json_line(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Failed to serialize {event:?}: {e}"),
        }
    }
}

/// Serialized event; the finished line also carries its local time.
fn json_line(event: &TransferEvent) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(event)?;
    if let (TransferEvent::Finished(_), Some(object)) = (event, value.as_object_mut()) {
        object.insert("at".into(), Local::now().to_rfc3339().into());
    }
    Ok(value)
}

impl ProgressSink for JsonSink {
    fn on_status(&mut self, text: &str) {
        self.emit(TransferEvent::Status(text.to_string()));
    }

    fn on_progress(&mut self, percent: f64) {
        self.emit(TransferEvent::Progress(percent));
    }

    fn on_finished(&mut self, outcome: &TransferOutcome) {
        self.emit(TransferEvent::Finished(outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line_matches_event_shape() {
        let line = json_line(&TransferEvent::Progress(50.0)).unwrap();
        assert_eq!(line, serde_json::json!({ "event": "progress", "value": 50.0 }));

        let line = json_line(&TransferEvent::Status("Connecting...".into())).unwrap();
        assert_eq!(line, serde_json::json!({ "event": "status", "value": "Connecting..." }));
    }

    #[test]
    fn test_json_finished_line_has_time() {
        let event = TransferEvent::Finished(TransferOutcome::Failed("Part 2 failed.".into()));
        let line = json_line(&event).unwrap();

        assert_eq!(line["event"], "finished");
        assert_eq!(line["value"], serde_json::json!({ "outcome": "failed", "message": "Part 2 failed." }));
        assert!(line["at"].as_str().is_some_and(|at| chrono::DateTime::parse_from_rfc3339(at).is_ok()));
    }
}
