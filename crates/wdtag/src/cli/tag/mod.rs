//! The `wdtag tag` command.

mod batch;
mod setup;
pub mod types;

pub use types::ReportFormat;

use clap::Args;
use std::path::PathBuf;
use wdtag_core::Config;

use batch::run_batch;
use setup::setup_tagger;

/// Arguments for the `tag` command.
#[derive(Args, Debug, Default)]
pub struct TagArgs {
    /// Image files or directories to tag
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Model bundle name (directory under the model root)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Minimum score for a tag to be emitted (0 to 1, inclusive)
    #[arg(short, long, value_parser = types::parse_threshold)]
    pub threshold: Option<f32>,

    /// Directory receiving one .txt file per image
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Write a machine-readable report to stdout
    #[arg(long, value_enum)]
    pub report: Option<ReportFormat>,

    /// Load the model once and reuse it for every image
    #[arg(long)]
    pub cache_model: bool,
}

/// Execute the tag command.
pub async fn execute(args: TagArgs, config: Config) -> anyhow::Result<()> {
    let tagger = setup_tagger(config, &args)?;

    let images = tagger.discover(&args.inputs);
    if images.is_empty() {
        tracing::warn!("No supported image files found in {:?}", args.inputs);
        return Ok(());
    }
    tracing::info!("Found {} image(s) to tag", images.len());

    let summary = run_batch(&tagger, images, args.report.map(Into::into)).await?;

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} image(s) failed; see the log above for details",
            summary.failed,
            summary.attempted
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: TagArgs,
    }

    #[test]
    fn test_parses_multiple_inputs_and_flags() {
        let cli = TestCli::try_parse_from([
            "wdtag",
            "a.jpg",
            "photos/",
            "--threshold",
            "0.5",
            "--report",
            "jsonl",
            "--cache-model",
        ])
        .unwrap();
        assert_eq!(
            cli.args.inputs,
            vec![PathBuf::from("a.jpg"), PathBuf::from("photos/")]
        );
        assert_eq!(cli.args.threshold, Some(0.5));
        assert_eq!(cli.args.report, Some(ReportFormat::Jsonl));
        assert!(cli.args.cache_model);
        assert!(cli.args.model.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(TestCli::try_parse_from(["wdtag", "a.jpg", "--threshold", "2"]).is_err());
    }

    #[test]
    fn test_requires_input() {
        assert!(TestCli::try_parse_from(["wdtag"]).is_err());
    }
}
