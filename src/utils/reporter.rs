//! Leveled console output for operators.
//!
//! These helpers only format and print; they keep no state and never decide
//! anything. Internal progress goes through `log` instead.

const RESET: &str = "\x1b[0m";
const BOLD_BLUE: &str = "\x1b[1;34m";
const GREEN: &str = "\x1b[0;32m";
const RED: &str = "\x1b[0;31m";
const YELLOW: &str = "\x1b[1;33m";
const CYAN: &str = "\x1b[0;36m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Header,
    Success,
    Error,
    Warning,
    Info,
}

impl Level {
    fn color(self) -> &'static str {
        match self {
            Level::Header => BOLD_BLUE,
            Level::Success => GREEN,
            Level::Error => RED,
            Level::Warning => YELLOW,
            Level::Info => CYAN,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Level::Header => "==>",
            Level::Success => "[OK]",
            Level::Error => "[ERROR]",
            Level::Warning => "[WARN]",
            Level::Info => "[INFO]",
        }
    }
}

/// Render a single colored line.
pub fn paint(level: Level, message: &str) -> String {
    format!("{}{}{} {}", level.color(), level.marker(), RESET, message)
}

pub fn header(message: &str) {
    println!();
    println!("{}", paint(Level::Header, message));
}

pub fn success(message: &str) {
    println!("{}", paint(Level::Success, message));
}

pub fn error(message: &str) {
    eprintln!("{}", paint(Level::Error, message));
}

pub fn warning(message: &str) {
    eprintln!("{}", paint(Level::Warning, message));
}

pub fn info(message: &str) {
    println!("{}", paint(Level::Info, message));
}
