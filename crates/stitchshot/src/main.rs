//! stitchshot: stitch vertically overlapping screenshots.
//!
//! Scans a folder for screenshots, pairs them by EXIF capture time and
//! writes one stitched image per pair. A `pair` subcommand stitches two
//! explicit files.
//!
//! # Usage
//!
//! ```text
//! stitchshot [--config stitchshot.toml] [-v | --spam] batch <INPUT> -o <OUTPUT>
//! stitchshot pair <FIRST> <SECOND> -o <OUTPUT>
//! ```
//!
//! Settings come from the config file first and are then overridden by
//! flags. `RUST_LOG` takes precedence over `--verbose` and `--spam`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use stitchshot_batch::{
    BatchConfig, CancelToken, ConfigError, ExifReader, PairStatus, load_rgb, run_folder,
};
use stitchshot_pipeline::{ImagePair, MetadataReader, TimestampExtractor, stitch_pair};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Stitch vertically overlapping screenshots into single images.
#[derive(Parser)]
#[command(name = "stitchshot", version)]
struct Cli {
    /// TOML config file. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace-level logging, including overlap search details.
    #[arg(long, global = true)]
    spam: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair and stitch every screenshot in a folder.
    Batch(BatchArgs),
    /// Stitch two screenshots into one image.
    Pair(PairArgs),
}

#[derive(Args)]
struct BatchArgs {
    /// Folder to scan for screenshots.
    input: Option<PathBuf>,

    /// Folder for stitched images. Created if missing.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum capture-time difference within a pair, in minutes.
    #[arg(long)]
    tolerance_minutes: Option<u32>,

    /// Output extension (png, jpg, jpeg, bmp, webp).
    #[arg(long)]
    extension: Option<String>,

    /// Also scan subfolders.
    #[arg(short, long)]
    recursive: bool,

    /// Worker threads.
    #[arg(short = 'j', long)]
    workers: Option<NonZeroUsize>,

    /// Output name for pairs without capture time.
    #[arg(long)]
    fixed_name: Option<String>,

    /// Write the paths of unpaired images to this file.
    #[arg(long)]
    omitted_list: Option<PathBuf>,

    /// Print the summary as JSON instead of a report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PairArgs {
    first: PathBuf,
    second: PathBuf,

    /// Output image path. The format follows the extension.
    #[arg(short, long)]
    output: PathBuf,
}

/// Merge the config file (if any) with command-line overrides.
fn config_from_cli(cli: &Cli) -> Result<BatchConfig, ConfigError> {
    let mut config = match cli.config {
        Some(ref path) => BatchConfig::from_toml_file(path)?,
        None => BatchConfig::default(),
    };

    config.verbose |= cli.verbose;
    config.spam |= cli.spam;

    if let Command::Batch(ref args) = cli.command {
        if let Some(ref input) = args.input {
            config.input_folder_path = Some(input.clone());
        }
        if let Some(ref output) = args.output {
            config.output_folder_path = Some(output.clone());
        }
        if let Some(minutes) = args.tolerance_minutes {
            config.tolerance_minutes = minutes;
        }
        if let Some(ref extension) = args.extension {
            config.output_extension.clone_from(extension);
        }
        if args.workers.is_some() {
            config.workers = args.workers;
        }
        if let Some(ref name) = args.fixed_name {
            config.fixed_output_name = Some(name.clone());
        }
        if let Some(ref list) = args.omitted_list {
            config.omitted_list_path = Some(list.clone());
        }
        config.recursive |= args.recursive;
    }

    Ok(config)
}

/// Default filter directive for the configured verbosity.
const fn log_level(config: &BatchConfig) -> &'static str {
    if config.spam {
        "trace"
    } else if config.verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(log_level(&config));

    match cli.command {
        Command::Batch(ref args) => run_batch_command(&config, args.json),
        Command::Pair(ref args) => run_pair_command(&config, args),
    }
}

fn run_batch_command(config: &BatchConfig, json: bool) -> ExitCode {
    let resolved = match config.validate() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let report = match run_folder(&resolved, &ExifReader, CancelToken::new(), |outcome| {
        if let PairStatus::Written { ref path, .. } = outcome.status {
            info!(output = %path.display(), "wrote stitched image");
        }
    }) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let summary = report.summary();
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error serializing summary: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", summary.report());
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_pair_command(config: &BatchConfig, args: &PairArgs) -> ExitCode {
    if let Err(e) = config.overlap.validate() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let extractor = TimestampExtractor::new(config.timestamp_tag.as_str());
    let pair = ImagePair {
        first: args.first.clone(),
        first_time: extractor.extract(ExifReader.read(&args.first).as_ref()),
        second: args.second.clone(),
        second_time: extractor.extract(ExifReader.read(&args.second).as_ref()),
    };
    if pair.first_time.is_none() || pair.second_time.is_none() {
        warn!("capture time missing, stitching in argument order");
    }

    let (upper_path, lower_path) = pair.ordered();
    let stitched = {
        let (upper, lower) = match (load_rgb(upper_path), load_rgb(lower_path)) {
            (Ok(u), Ok(l)) => (u, l),
            (Err(e), _) | (_, Err(e)) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        };
        stitch_pair(&upper, &lower, &config.overlap)
    };

    info!(
        bottom_trim = stitched.offset.bottom_trim,
        top_trim = stitched.offset.top_trim,
        "overlap detected"
    );

    if let Err(e) = stitched.image.save(&args.output) {
        eprintln!("Error saving {}: {e}", args.output.display());
        return ExitCode::FAILURE;
    }

    let size = stitched.dimensions();
    println!(
        "{} ({}x{})",
        args.output.display(),
        size.width,
        size.height
    );
    ExitCode::SUCCESS
}
