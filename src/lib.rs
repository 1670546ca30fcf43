//! mepkit: labeled image datasets in obfuscated `.mep` containers.
//!
//! mepkit converts a folder of images with paired `.txt` labels into a
//! renumbered tree of `.mep` container files, and reads those containers
//! back as ordinary images for training pipelines.
//!
//! # Modules
//!
//! - [`cipher`]: repeating-key XOR transform and key management
//! - [`container`]: the `.mep` file convention
//! - [`bridge`]: transparent image reads for raw and container files
//! - [`dataset`]: source tree discovery (flat or split by mode)
//! - [`convert`]: the conversion pipeline and its report
//! - [`scan`]: dry-run dataset checks
//! - [`error`]: error types for mepkit operations

pub mod bridge;
pub mod cipher;
pub mod container;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod logger;
pub mod scan;

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{info, warn};

pub use error::{MepError, Result};

use bridge::TerminalPreview;
use cipher::KeyManager;
use container::ContainerCodec;
use convert::{ConvertOptions, PictureFormat};
use logger::Logger;

/// The mepkit CLI application.
#[derive(Parser)]
#[command(name = "mepkit")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert an image+label folder into a .mep dataset.
    Convert(ConvertArgs),
    /// Decode a single .mep container back to its payload bytes.
    Decode(DecodeArgs),
    /// Check a source dataset for missing labels and unreadable images.
    Validate(ValidateArgs),
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Source dataset directory.
    #[arg(long)]
    dataset: PathBuf,

    /// Output directory (created if missing).
    #[arg(long)]
    output: PathBuf,

    /// Secret key used to obfuscate the containers.
    #[arg(long = "mep-key", alias = "mep_key")]
    mep_key: String,

    /// Re-encode images to WebP before obfuscation.
    #[arg(long, alias = "use_webp", conflicts_with = "reencode")]
    use_webp: bool,

    /// Re-encode images to the given format before obfuscation.
    #[arg(long, value_enum)]
    reencode: Option<PictureFormat>,

    /// Do not show the decoded sample after conversion.
    #[arg(long, alias = "no_preview")]
    no_preview: bool,

    /// Report format ('text' or 'json').
    #[arg(long, default_value = "text")]
    report: String,
}

/// Arguments for the decode subcommand.
#[derive(clap::Args)]
struct DecodeArgs {
    /// Container file to decode.
    input: PathBuf,

    /// Where to write the decoded payload.
    #[arg(short, long)]
    output: PathBuf,

    /// Secret key; recovered from MEP_KEY when omitted.
    #[arg(long = "mep-key", alias = "mep_key")]
    mep_key: Option<String>,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Source dataset directory.
    input: PathBuf,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the mepkit CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    Logger::init(logger::level_from_flags(cli.verbose, cli.quiet));

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Decode(args)) => run_decode(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => {
            println!("mepkit {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Labeled image datasets in obfuscated .mep containers.");
            println!();
            println!("Run 'mepkit --help' for usage information.");
            Ok(())
        }
    }
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    check_report_format(&args.report)?;
    // Keep stdout parseable when the report is JSON.
    if args.report == "json" && log::max_level() == log::LevelFilter::Info {
        log::set_max_level(log::LevelFilter::Warn);
    }

    let keys = KeyManager::from_env();
    keys.set_key(&args.mep_key)?;
    info!("Using cipher.");
    let codec = ContainerCodec::new(&keys);

    let opts = ConvertOptions {
        dataset: args.dataset,
        output: args.output,
        use_webp: args.use_webp,
        no_preview: args.no_preview,
        reencode: args.reencode,
    };

    // Stdout carries the report; the preview goes to stderr.
    let stdin = io::stdin();
    let mut preview = TerminalPreview::new(stdin.lock(), io::stderr());
    let report = convert::convert_dataset(&codec, &opts, &mut preview)?;

    if report.verification.is_failed() {
        warn!("conversion finished, but the sample container could not be read back");
    }

    match args.report.as_str() {
        "json" => println!("{}", to_json(&report)?),
        _ => print!("{}", report),
    }
    Ok(())
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    let keys = KeyManager::from_env();
    if let Some(secret) = &args.mep_key {
        keys.set_key(secret)?;
    }
    let codec = ContainerCodec::new(&keys);

    let payload = codec.decode(&args.input)?.into_inner();
    fs::write(&args.output, &payload)?;

    match image::guess_format(&payload) {
        Ok(format) => info!(
            "Decoded {} => {} ({:?}, {} bytes)",
            args.input.display(),
            args.output.display(),
            format,
            payload.len()
        ),
        Err(_) => warn!(
            "Decoded {} => {}, but the payload is not a recognizable image; is the key correct?",
            args.input.display(),
            args.output.display()
        ),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    check_report_format(&args.output)?;
    let report = scan::scan_dataset(&args.input)?;

    match args.output.as_str() {
        "json" => println!("{}", to_json(&report)?),
        _ => print!("{}", report),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (args.strict && has_warnings) {
        Err(MepError::ScanFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn check_report_format(format: &str) -> Result<()> {
    match format {
        "text" | "json" => Ok(()),
        other => Err(MepError::UnsupportedFormat(format!(
            "'{}' (supported: text, json)",
            other
        ))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(MepError::ReportJson)
}
