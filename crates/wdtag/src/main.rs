//! wdtag CLI - batch image tagging with WD14-style ONNX classifiers.
//!
//! Writes one comma-separated tag file per image into an output directory.
//! Re-running over the same output directory skips images that already have
//! a valid tag file and regenerates ones that look stale.
//!
//! # Usage
//!
//! ```bash
//! # Download the default model bundle
//! wdtag models download
//!
//! # Tag a directory of images
//! wdtag tag ./photos/ --output-dir ./tags
//!
//! # Stream a machine-readable report to stdout
//! wdtag tag ./photos/ --report jsonl > report.jsonl
//!
//! # View configuration
//! wdtag config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// wdtag - batch image tagging with WD14-style ONNX classifiers.
#[derive(Parser, Debug)]
#[command(name = "wdtag")]
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
    /// Tag images and write one .txt file per image
    Tag(cli::tag::TagArgs),

    /// Manage model bundles (list, download, etc.)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match wdtag_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `wdtag config path`."
            );
            wdtag_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("wdtag v{}", wdtag_core::VERSION);

    match cli.command {
        Commands::Tag(args) => cli::tag::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
