//! Status lines for the terminal.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
enum Level {
    Success,
    Info,
    Warning,
    Error,
}

fn render(level: Level, message: &str) -> String {
    match level {
        Level::Success => format!("{} {}", "✓".green().bold(), message),
        Level::Info => format!("{} {}", "ℹ".blue().bold(), message),
        Level::Warning => format!("{} {}", "⚠".yellow().bold(), message.yellow()),
        Level::Error => format!("{} {}", "✗".red().bold(), message.red()),
    }
}

pub fn success(message: &str) {
    eprintln!("{}", render(Level::Success, message));
}

pub fn info(message: &str) {
    eprintln!("{}", render(Level::Info, message));
}

pub fn warning(message: &str) {
    eprintln!("{}", render(Level::Warning, message));
}

pub fn error(message: &str) {
    eprintln!("{}", render(Level::Error, message));
}
