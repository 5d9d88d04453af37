//! Shared utilities for commands

use owo_colors::OwoColorize;
use std::path::Path;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Print whether a path exists
pub fn print_exists_status(label: &str, path: &Path) {
    if path.symlink_metadata().is_ok() {
        println!("{} {}: {}", "Found:".green(), label, path.display());
    } else {
        println!("{} {}: {}", "Not found:".yellow(), label, path.display());
    }
}
