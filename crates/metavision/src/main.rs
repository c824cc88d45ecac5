//! MetaVision CLI - Extract structured metadata from a single image.
//!
//! MetaVision reports file facts, image geometry, camera settings, GPS
//! location, colors, recognized text and QR codes as one JSON record. A
//! versioned offline cache keeps the hosting application's assets usable
//! without a network.
//!
//! # Usage
//!
//! ```bash
//! # Extract metadata from one image
//! metavision extract photo.jpg
//!
//! # Several images as JSON Lines, uploading reference copies to the image host
//! metavision extract a.jpg b.png --format jsonl --upload
//!
//! # Install or update the offline cache
//! metavision cache sync
//!
//! # View configuration
//! metavision config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// MetaVision - Image metadata extraction with an offline cache.
#[derive(Parser, Debug)]
#[command(name = "metavision")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract metadata from one or more images
    Extract(cli::extract::ExtractArgs),

    /// Manage the offline cache (sync, fetch, list, clear)
    Cache(cli::cache::CacheArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match metavision_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `metavision config path`."
            );
            metavision_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("MetaVision v{}", metavision_core::VERSION);

    match cli.command {
        Commands::Extract(args) => cli::extract::execute(args, config).await,
        Commands::Cache(args) => cli::cache::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
