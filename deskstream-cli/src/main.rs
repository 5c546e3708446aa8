//! Deskstream CLI
//!
//! Desktop capture to a raw H.264 elementary stream.
//!
//! # Usage
//!
//! ```bash
//! # Capture at 10 fps into a file
//! deskstream run --fps 10 --output desktop.h264
//!
//! # Pipe Annex B to a player
//! deskstream run --nal-mode with-start-codes | ffplay -f h264 -
//!
//! # Show encoder and backend support
//! deskstream info
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deskstream_core::config::{ConfigFile, LogConfig};
use tracing::{warn, Level};
use tracing_subscriber::EnvFilter;

/// Deskstream - desktop capture to H.264
#[derive(Parser)]
#[command(name = "deskstream")]
#[command(version)]
#[command(about = "Capture the desktop and encode it to an H.264 elementary stream", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and encode until Ctrl+C
    Run(commands::RunArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// Show encoder and capture capabilities
    Info,
}

/// Install the global subscriber
///
/// `-v` raises the configured level, never lowers it. Logs go to stderr so
/// stdout can carry the stream.
fn init_logging(log: &LogConfig, verbose: u8) -> Result<()> {
    let configured = log.level()?;
    let level = match verbose {
        0 => configured,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
    .max(configured);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("deskstream={}", level).parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(log.source_location)
        .with_line_number(log.source_location);

    if log.timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (file, load_error) = match ConfigFile::load() {
        Ok(file) => (file, None),
        Err(e) => (ConfigFile::default(), Some(e)),
    };

    let mut log = file.log.clone();
    if let Commands::Run(args) = &cli.command {
        args.apply_log(&mut log);
    }
    init_logging(&log, cli.verbose)?;

    if let Some(e) = load_error {
        warn!("Failed to load config file: {}, using defaults", e);
    }

    // Run the appropriate command
    match cli.command {
        Commands::Run(args) => commands::run(args, file).await?,
        Commands::Config(args) => commands::config(args, &file).await?,
        Commands::Info => commands::info(&file).await?,
    }

    Ok(())
}
