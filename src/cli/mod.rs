//! Administrative commands behind `myrvm-cli`.
//!
//! Commands write their report to any [`std::io::Write`] and ask for confirmation
//! through [`Confirm`], so they can be driven from tests.

pub mod cache;
pub mod session;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL};

/// Asks the operator before a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool>;
}

/// Terminal prompt; defaults to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct Interactive;

impl Confirm for Interactive {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        Ok(dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

/// Empty table with the CLI's look and a green header row.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Green)));
    table
}

/// `45s`, `3m`, `2h`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", (seconds as f64 / 60.0).round() as u64)
    } else {
        format!("{}h", (seconds as f64 / 3600.0).round() as u64)
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// First eight characters of a token, for listings.
pub fn short_id(id: &str) -> String {
    let head: String = id.chars().take(8).collect();
    format!("{}...", head)
}
