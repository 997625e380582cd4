//! Console output helpers.
//!
//! Summaries go to stdout; logs go to stderr through tracing.

use std::sync::Arc;
use std::time::Duration;

use assetdelta::fetch::{FetchProgress, FetchProgressCallback};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

pub fn header(text: &str) {
    println!("{}", style(text).bold().underlined());
}

pub fn line(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {}", format!("{}:", label), value);
}

pub fn indented(text: &str) {
    println!("    {}", text);
}

pub fn success(text: &str) {
    println!("{} {}", style("✓").green(), text);
}

pub fn warning(text: &str) {
    println!("{} {}", style("!").yellow().bold(), text);
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// A progress bar plus the fetcher callback that drives it.
pub fn fetch_progress() -> (ProgressBar, FetchProgressCallback) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let handle = bar.clone();
    let callback: FetchProgressCallback = Arc::new(move |p: FetchProgress| {
        handle.set_length(p.total as u64);
        handle.set_position(p.finished as u64);
        if p.failed > 0 {
            handle.set_message(format!("{} ({} failed)", format_bytes(p.bytes), p.failed));
        } else {
            handle.set_message(format_bytes(p.bytes));
        }
    });
    (bar, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
