//! AX3 Flux CLI - Command-line interface for accelerometer feature extraction
//!
//! Commands:
//! - extract: Raw samples to a per-epoch feature CSV
//! - daily: Raw samples to wear-time compliant daily aggregates (JSON)
//! - config: Print the default pipeline configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use ax3_flux::{
    FeatureProcessor, PipelineConfig, PipelineError, RawRecording, FLUX_VERSION, PRODUCER_NAME,
};

/// AX3 Flux - feature extraction for raw tri-axial accelerometer data
#[derive(Parser)]
#[command(name = "ax3flux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Turn raw accelerometer samples into epoch and daily features", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the per-epoch feature table
    Extract {
        /// Raw `timestamp_ms,x,y,z` CSV (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Feature CSV (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Mask non-wear epochs with empty values instead of removing them
        #[arg(long)]
        mask: bool,

        /// Write a JSON run report (run id, columns, warnings)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Aggregate wear-time compliant days
    Daily {
        /// Raw `timestamp_ms,x,y,z` CSV (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Daily aggregates JSON (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the default configuration
    Config,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Ax3CliError> {
    match cli.command {
        Commands::Extract {
            input,
            output,
            config,
            mask,
            report,
        } => cmd_extract(&input, &output, config.as_deref(), mask, report.as_deref()),

        Commands::Daily {
            input,
            output,
            config,
            pretty,
        } => cmd_daily(&input, &output, config.as_deref(), pretty),

        Commands::Config => {
            println!("{}", PipelineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Ax3CliError> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_recording(input: &Path) -> Result<RawRecording, Ax3CliError> {
    let recording = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(Ax3CliError::InteractiveStdin);
        }
        RawRecording::from_csv(io::stdin().lock())?
    } else {
        RawRecording::from_csv(BufReader::new(fs::File::open(input)?))?
    };

    if recording.is_empty() {
        return Err(Ax3CliError::NoSamples);
    }
    Ok(recording)
}

fn write_output(output: &Path, data: &[u8]) -> Result<(), Ax3CliError> {
    if output.to_string_lossy() == "-" {
        io::stdout().lock().write_all(data)?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn cmd_extract(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    mask: bool,
    report: Option<&Path>,
) -> Result<(), Ax3CliError> {
    let mut config = load_config(config)?;
    if mask {
        config.non_wear.remove = false;
    }

    let recording = read_recording(input)?;
    let processor = FeatureProcessor::new(config)?;
    let run = processor.process(&recording)?;

    let mut csv = Vec::new();
    run.table.write_csv(&mut csv)?;
    write_output(output, &csv)?;

    if let Some(path) = report {
        let report = RunReportFile {
            producer: PRODUCER_NAME,
            version: FLUX_VERSION,
            run: run.summary(),
        };
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}

fn cmd_daily(input: &Path, output: &Path, config: Option<&Path>, pretty: bool) -> Result<(), Ax3CliError> {
    let recording = read_recording(input)?;
    let processor = FeatureProcessor::new(load_config(config)?)?;
    let daily = processor.process_daily(&recording)?;

    let mut json = if pretty {
        serde_json::to_string_pretty(&daily)?
    } else {
        serde_json::to_string(&daily)?
    };
    json.push('\n');
    write_output(output, json.as_bytes())
}

#[derive(serde::Serialize)]
struct RunReportFile {
    producer: &'static str,
    version: &'static str,
    #[serde(flatten)]
    run: ax3_flux::pipeline::RunSummary,
}

// Error types

#[derive(Debug)]
enum Ax3CliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    InteractiveStdin,
    NoSamples,
}

impl From<io::Error> for Ax3CliError {
    fn from(e: io::Error) -> Self {
        Ax3CliError::Io(e)
    }
}

impl From<PipelineError> for Ax3CliError {
    fn from(e: PipelineError) -> Self {
        Ax3CliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for Ax3CliError {
    fn from(e: serde_json::Error) -> Self {
        Ax3CliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<Ax3CliError> for CliError {
    fn from(e: Ax3CliError) -> Self {
        match e {
            Ax3CliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            Ax3CliError::Pipeline(e) => {
                let (code, hint) = match &e {
                    PipelineError::Parse(_) => ("PARSE_ERROR", "Input must be timestamp_ms,x,y,z lines"),
                    PipelineError::Json(_) => ("CONFIG_ERROR", "Check the configuration JSON syntax"),
                    e if e.is_configuration() => {
                        ("CONFIG_ERROR", "Run 'ax3flux config' to see a valid configuration")
                    }
                    e if e.is_shape() => (
                        "SHAPE_ERROR",
                        "The sample count must be a multiple of epoch.samples_per_epoch",
                    ),
                    _ => ("PIPELINE_ERROR", "Re-run with RUST_LOG=debug for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            Ax3CliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            Ax3CliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal".to_string(),
                hint: Some("Pipe a CSV into ax3flux or pass --input <file>".to_string()),
            },
            Ax3CliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
        }
    }
}
