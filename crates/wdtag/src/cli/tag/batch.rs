//! Running a batch with a progress bar, per-image lines and an optional report.

use std::io::{BufWriter, Stdout};
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use wdtag_core::{
    BatchSummary, CancelToken, Outcome, OutputFormat, OutputWriter, ProgressEvent,
    ProgressObserver, Tagger,
};

/// Feeds batch progress to the terminal and, optionally, a report on stdout.
struct CliObserver {
    progress: ProgressBar,
    report: Option<OutputWriter<BufWriter<Stdout>>>,
}

impl ProgressObserver for CliObserver {
    fn on_image(&mut self, event: &ProgressEvent) {
        let name = event
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| event.image.display().to_string());

        if let Some(line) = status_line(event.outcome, &name, &event.detail) {
            self.progress.println(line);
        }
        self.progress.inc(1);
        self.progress.set_message(format!(
            "{} done, {} skipped, {} failed",
            event.counts.completed, event.counts.skipped, event.counts.failed
        ));

        if let Some(report) = &mut self.report {
            report.on_image(event);
        }
    }

    fn on_finish(&mut self, summary: &BatchSummary) {
        self.progress.finish_and_clear();
        if let Some(report) = &mut self.report {
            report.on_finish(summary);
        }
    }
}

/// The line printed above the progress bar for one image.
fn status_line(outcome: Outcome, name: &str, detail: &str) -> Option<String> {
    match outcome {
        Outcome::Completed => Some(format!("  tagged   {name}: {detail}")),
        Outcome::Retagged => Some(format!("  retagged {name}")),
        Outcome::Failed => Some(format!("  failed   {name}: {detail}")),
        Outcome::Skipped => None,
    }
}

/// Tag `images`, cancelling on Ctrl-C, and print a summary.
pub async fn run_batch(
    tagger: &Tagger,
    images: Vec<PathBuf>,
    report: Option<OutputFormat>,
) -> anyhow::Result<BatchSummary> {
    let cancel = CancelToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current image");
                cancel.cancel();
            }
        })
    };

    let mut observer = CliObserver {
        progress: create_progress_bar(images.len() as u64),
        report: report.map(|format| OutputWriter::new(BufWriter::new(std::io::stdout()), format)),
    };

    let request = tagger.request(images).with_cancel(cancel);
    let result = tagger.run(request, &mut observer).await;
    interrupt.abort();

    let summary = result?;
    print_summary(&summary);
    Ok(summary)
}

/// Create a progress bar for batch processing.
fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after a batch.
fn print_summary(summary: &BatchSummary) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Completed:    {:>8}", summary.completed);
    if summary.retagged > 0 {
        eprintln!("      retagged:   {:>8}", summary.retagged);
    }
    if summary.skipped > 0 {
        eprintln!("    Skipped:      {:>8}", summary.skipped);
    }
    if summary.failed > 0 {
        eprintln!("    Failed:       {:>8}", summary.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", summary.total);
    if summary.cancelled {
        eprintln!(
            "    Cancelled after {} of {} image(s)",
            summary.attempted, summary.total
        );
    }
    eprintln!("    Duration:     {:>7.1}s", summary.elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", summary.rate());
    eprintln!("  ====================================");
}
