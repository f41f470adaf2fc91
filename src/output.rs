//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored status
//! lines, rename action pairs, dry-run notices, and the crawl progress bar.
//! Everything user-visible goes through here so formatting can change in one
//! place.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Manages all CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints the before/after pair for one executed action.
    pub fn action(original: &Path, new: &Path) {
        println!("Original: {}", original.display());
        println!("     New: {}\n", new.display());
    }

    /// Prints a would-be action in dry-run mode.
    pub fn would(verb: &str, original: &Path, new: &Path) {
        println!(
            "{}",
            format!(
                "[DRY RUN] Would {} {} to {}",
                verb,
                original.display(),
                new.display()
            )
            .yellow()
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates the crawl progress bar.
    ///
    /// The total file count is unknown up front, so this is a spinner with a
    /// live counter. It draws to stderr, keeping action lines on stdout
    /// clean.
    pub fn create_crawl_spinner(root: &Path) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {pos} files ({per_sec})")
                .expect("Invalid progress bar template"),
        );
        spinner.set_message(format!("Crawling {}", root.display()));
        spinner
    }
}
