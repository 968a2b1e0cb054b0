//! Engage CLI - Command-line interface for Engage Flux
//!
//! Commands:
//! - replay: Replay recorded frame observations through the engine and emit reports
//! - validate: Validate a frame record file
//! - config: Print the effective engine configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use engage_flux::types::{FaceLandmarks, FrameObservation, FrameResult, SessionReport};
use engage_flux::{EngagementEngine, EngineConfig, EngineError, ENGAGE_VERSION, PRODUCER_NAME};

/// Engage - Per-session engagement signal engine
#[derive(Parser)]
#[command(name = "engage")]
#[command(author = "Synheart AI Inc")]
#[command(version = ENGAGE_VERSION)]
#[command(about = "Turn per-frame classifier outputs into engagement reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frame observations and emit session reports
    Replay {
        /// Input NDJSON file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Also emit the per-frame results
        #[arg(long)]
        frames: bool,

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Intended duration recorded on every replayed session
        #[arg(long, default_value = "0")]
        timer_minutes: u32,
    },

    /// Validate a frame record file
    Validate {
        /// Input NDJSON file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective engine configuration
    Config {
        /// Engine configuration JSON file to check
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// One recorded frame: classifier outputs for a frame of a named session
#[derive(Debug, Deserialize)]
struct FrameRecord {
    session: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    width: u32,
    height: u32,
    #[serde(default)]
    face_probability: Option<f64>,
    #[serde(default)]
    landmarks: Option<FaceLandmarks>,
    #[serde(default)]
    phone: bool,
}

impl FrameRecord {
    fn into_observation(self, fallback: DateTime<Utc>) -> (String, FrameObservation) {
        let observation = FrameObservation {
            captured_at: self.timestamp.unwrap_or(fallback),
            width: self.width,
            height: self.height,
            face_probability: self.face_probability,
            landmarks: self.landmarks,
            phone_detected: self.phone,
        };
        (self.session, observation)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutputRecord {
    Frame {
        session: String,
        frame_result: FrameResult,
    },
    Report {
        session: String,
        report: SessionReport,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with records on stdout
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("engage_flux=info,engage=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn run(cli: Cli) -> Result<(), EngageCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            frames,
            config,
            timer_minutes,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            frames,
            config.as_deref(),
            timer_minutes,
        ),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    emit_frames: bool,
    config: Option<&Path>,
    timer_minutes: u32,
) -> Result<(), EngageCliError> {
    let config = load_config(config)?;
    let engine = EngagementEngine::with_config(config)?;

    let input_data = read_input(input)?;
    let records = parse_records(&input_data)?;
    if records.is_empty() {
        return Err(EngageCliError::NoFrames);
    }
    info!(frames = records.len(), "replaying frame records");
    let outputs = replay(&engine, records, timer_minutes, emit_frames, Utc::now())?;

    let output_data = format_output(&outputs, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

/// Apply records in order, then end every session at its last frame time.
///
/// Records without a timestamp are stamped `replay_start`.
fn replay(
    engine: &EngagementEngine,
    records: Vec<(usize, FrameRecord)>,
    timer_minutes: u32,
    emit_frames: bool,
    replay_start: DateTime<Utc>,
) -> Result<Vec<OutputRecord>, EngageCliError> {
    // Sessions are reported in order of first appearance
    let mut order: Vec<String> = Vec::new();
    let mut sessions: HashMap<String, (Uuid, DateTime<Utc>)> = HashMap::new();
    let mut outputs: Vec<OutputRecord> = Vec::new();

    for (line, record) in records {
        let (key, observation) = record.into_observation(replay_start);
        // The engine degrades out-of-range values, so the replay carries on
        if let Err(e) = observation.validate() {
            warn!(line, error = %e, "frame record out of range");
        }

        let (id, last_seen) = sessions.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            let id = engine.start_session_at(timer_minutes, observation.captured_at);
            (id, observation.captured_at)
        });
        if observation.captured_at > *last_seen {
            *last_seen = observation.captured_at;
        }

        let result = engine.observe(id, &observation)?;
        debug!(session = %key, frames = result.frames_total, "replayed frame");
        if emit_frames {
            outputs.push(OutputRecord::Frame {
                session: key,
                frame_result: result,
            });
        }
    }

    for key in order {
        if let Some((id, last_seen)) = sessions.remove(&key) {
            let report = engine.end_session_at(&id, last_seen)?;
            outputs.push(OutputRecord::Report {
                session: key,
                report,
            });
        }
    }

    Ok(outputs)
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), EngageCliError> {
    let input_data = read_input(input)?;

    let mut total = 0;
    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    for (line, raw) in non_empty_lines(&input_data) {
        total += 1;
        let checked = serde_json::from_str::<FrameRecord>(raw)
            .map_err(EngineError::from)
            .and_then(|record| record.into_observation(Utc::now()).1.validate());
        if let Err(e) = checked {
            errors.push(ValidationErrorDetail {
                line,
                error: e.to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_records: total,
        valid_records: total - errors.len(),
        invalid_records: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(EngageCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_config(config: Option<&Path>) -> Result<(), EngageCliError> {
    let config = load_config(config)?;
    let report = ConfigReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGAGE_VERSION.to_string(),
        config,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, EngageCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, EngageCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("Reading frame records from stdin (end with Ctrl-D)...");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Yields `(1-based line number, trimmed line)` for non-blank lines
fn non_empty_lines(data: &str) -> impl Iterator<Item = (usize, &str)> {
    data.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn parse_records(data: &str) -> Result<Vec<(usize, FrameRecord)>, EngageCliError> {
    non_empty_lines(data)
        .map(|(line, raw)| {
            let record: FrameRecord = serde_json::from_str(raw).map_err(|e| {
                EngageCliError::ParseError(format!("Line {}: {}", line, e))
            })?;
            Ok((line, record))
        })
        .collect()
}

fn format_output(records: &[OutputRecord], format: &OutputFormat) -> Result<String, EngageCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum EngageCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoFrames,
    ValidationFailed(usize),
    ParseError(String),
}

impl From<io::Error> for EngageCliError {
    fn from(e: io::Error) -> Self {
        EngageCliError::Io(e)
    }
}

impl From<EngineError> for EngageCliError {
    fn from(e: EngineError) -> Self {
        EngageCliError::Engine(e)
    }
}

impl From<serde_json::Error> for EngageCliError {
    fn from(e: serde_json::Error) -> Self {
        EngageCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EngageCliError> for CliError {
    fn from(e: EngageCliError) -> Self {
        match e {
            EngageCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EngageCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'engage validate' on the input or check the config".to_string()),
            },
            EngageCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EngageCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frame records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            EngageCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            EngageCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one frame record object".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    line: usize,
    error: String,
}

#[derive(Serialize)]
struct ConfigReport {
    producer: String,
    version: String,
    config: EngineConfig,
}
