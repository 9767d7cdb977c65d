//! Terminal output: colored messages and tables

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

/// Rows printed per table before the rest is summarized
pub const TABLE_LIMIT: usize = 20;

pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Errors go to stderr so `--json` output stays parseable
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Footer for a table cut at `TABLE_LIMIT` rows, if it was cut
pub fn overflow_note(total: usize) -> Option<String> {
    (total > TABLE_LIMIT).then(|| format!("... and {} more", total - TABLE_LIMIT))
}

pub fn print_overflow(total: usize) {
    if let Some(note) = overflow_note(total) {
        println!("{}", note.dimmed());
    }
}

/// Human-readable size of a database or report file
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}
