use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn print_rows<T: Serialize + Tabled>(rows: Vec<T>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "no results".dimmed());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
    }
}

pub fn print_one<T: Serialize>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        }
    }
}

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", "\u{2713}".green(), message.as_ref());
}

pub fn failure(message: impl AsRef<str>) {
    eprintln!("{} {}", "\u{2717}".red(), message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    println!("{} {}", "\u{26a0}".yellow(), message.as_ref());
}
