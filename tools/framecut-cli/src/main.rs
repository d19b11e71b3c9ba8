//! Framecut CLI: command-line interface for compiling timeline snapshots to video.
//!
//! Usage:
//!   framecut export <PATH>     Render a snapshot to a video file
//!   framecut debug <PATH>      Print the compiled command and processing state
//!   framecut validate <PATH>   Check a snapshot for structural and timing issues
//!   framecut check             Check ffmpeg and font availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framecut_common::config::{AppConfig, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "framecut",
    about = "Compile editor timelines into a single ffmpeg render",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/framecut/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a timeline snapshot to video
    Export {
        /// Path to the snapshot JSON file
        path: PathBuf,

        /// Output file path (defaults to output.<ext> next to the snapshot)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the snapshot's quality tier: low|medium|high
        #[arg(long)]
        quality: Option<String>,
    },

    /// Show the compiled command and processing state without rendering
    Debug {
        /// Path to the snapshot JSON file
        path: PathBuf,
    },

    /// Validate a timeline snapshot
    Validate {
        /// Path to the snapshot JSON file
        path: PathBuf,
    },

    /// Check ffmpeg and font availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load(),
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    framecut_common::logging::init_logging(&LoggingConfig {
        level,
        ..config.logging.clone()
    });

    match cli.command {
        Commands::Export {
            path,
            output,
            quality,
        } => commands::export::run(&config, path, output, quality).await,
        Commands::Debug { path } => commands::debug::run(&config, path).await,
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Check => commands::check::run(&config).await,
    }
}
