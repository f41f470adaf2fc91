//! Command-line interface and run orchestration.
//!
//! Startup is strict: settings are loaded and validated before anything
//! touches the tree, and any configuration problem aborts the process with a
//! non-zero status. Once the run starts, every error is per-file and the run
//! always finishes with a summary.

use crate::config::Settings;
use crate::history::HistoryStore;
use crate::output::OutputFormatter;
use crate::pipeline::{Pipeline, RunReport};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

/// Reorganize a personal media tree.
#[derive(Parser, Debug)]
#[command(name = "mediatidy", version, about)]
pub struct Cli {
    /// Root directory to process (overrides the configured root_dir).
    pub root: Option<PathBuf>,

    /// Path to the settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print planned actions without touching the filesystem.
    #[arg(long, conflicts_with = "execute")]
    pub dry_run: bool,

    /// Apply the planned actions, overriding a dry_run = true setting.
    #[arg(long)]
    pub execute: bool,

    /// Worker pool size (overrides the configured thread count).
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Runs the application for one parsed command line.
///
/// # Errors
///
/// Returns an error string for configuration problems; the caller turns it
/// into a non-zero exit.
pub fn run(cli: Cli) -> Result<(), String> {
    let mut settings =
        Settings::load(cli.config.as_deref()).map_err(|e| e.to_string())?;

    if let Some(root) = cli.root {
        settings.root_dir = root;
    }
    if let Some(threads) = cli.threads {
        settings.threads = threads;
    }
    if cli.dry_run {
        settings.dry_run = true;
    }
    if cli.execute {
        settings.dry_run = false;
    }

    settings.validate().map_err(|e| e.to_string())?;
    let exclusions = settings.compile_exclusions().map_err(|e| e.to_string())?;
    let history = HistoryStore::load(&settings.history_file).map_err(|e| e.to_string())?;

    OutputFormatter::info(&format!(
        "mediatidy {} — processing {}",
        env!("CARGO_PKG_VERSION"),
        settings.root_dir.display()
    ));
    if settings.dry_run {
        OutputFormatter::dry_run_notice("No files will be modified.");
    }

    let wire_codecs = !settings.dry_run && settings.stages.converts;
    let mut pipeline = Pipeline::new(settings, exclusions, history);
    if wire_codecs {
        pipeline = pipeline.with_default_codecs();
    }

    let started = Instant::now();
    let report = pipeline.run()?;
    print_summary(&report, started.elapsed().as_secs_f64());

    Ok(())
}

/// End-of-run summary: counters first, then the remnant conversion queues.
fn print_summary(report: &RunReport, elapsed_seconds: f64) {
    OutputFormatter::header("SUMMARY");
    OutputFormatter::plain(&format!("Total time: {:.2} seconds", elapsed_seconds));
    OutputFormatter::plain(&format!("Total files: {}", report.stats.files));

    if report.stats.excluded_dirs > 0 {
        OutputFormatter::plain(&format!(
            "Protected directories skipped: {}",
            report.stats.excluded_dirs
        ));
    }
    if report.stats.partial_skipped > 0 {
        OutputFormatter::plain(&format!(
            "Partial downloads skipped: {}",
            report.stats.partial_skipped
        ));
    }
    if report.stats.unreadable_dirs > 0 {
        OutputFormatter::warning(&format!(
            "Unreadable directories skipped: {}",
            report.stats.unreadable_dirs
        ));
    }

    if report.actions == 0 {
        OutputFormatter::success("No actions necessary!");
    } else {
        OutputFormatter::plain(&format!("Actions: {}", report.actions));
        OutputFormatter::plain(&format!(
            "Renames recorded: {}",
            report.renames_recorded
        ));
    }

    if !report.pending_videos.is_empty() {
        OutputFormatter::header(&format!(
            "Videos to convert: ({})",
            report.pending_videos.len()
        ));
        for video in &report.pending_videos {
            OutputFormatter::plain(&video.display().to_string());
        }
    }

    if !report.pending_images.is_empty() {
        OutputFormatter::header(&format!(
            "Images to convert: ({})",
            report.pending_images.len()
        ));
        for image in &report.pending_images {
            OutputFormatter::plain(&image.display().to_string());
        }
    }
}
