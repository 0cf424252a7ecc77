//! Human-readable, colorized-on-TTY output plus tabular `get` output
//! (spec §7: "Logs are human-readable and colorized on TTY;
//! machine-readable tabular output is provided for `get` commands").

use colored::Colorize;
use std::io::IsTerminal;

fn color_enabled() -> bool {
    std::io::stdout().is_terminal()
}

pub fn success(msg: &str) {
    if color_enabled() {
        println!("{} {msg}", "✓".green().bold());
    } else {
        println!("OK: {msg}");
    }
}

pub fn error(msg: &str) {
    if color_enabled() {
        eprintln!("{} {msg}", "✗".red().bold());
    } else {
        eprintln!("ERROR: {msg}");
    }
}

pub fn warn(msg: &str) {
    if color_enabled() {
        eprintln!("{} {msg}", "!".yellow().bold());
    } else {
        eprintln!("WARNING: {msg}");
    }
}

/// Prints a simple left-aligned table: header row, then one row per
/// item. Column widths are sized to the header plus this dataset only —
/// no attempt is made to stream-format a table whose rows arrive later.
pub fn table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    let header_line = header_line.join("  ");
    if color_enabled() {
        println!("{}", header_line.bold());
    } else {
        println!("{header_line}");
    }

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", line.join("  "));
    }
}
