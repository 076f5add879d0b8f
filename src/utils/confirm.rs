use async_trait::async_trait;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Strategy answering the yes/no gates in front of destructive or slow steps.
///
/// Asking is async so an interrupt can win the race while a prompt is open.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Asks on the controlling terminal. Anything but `y`/`yes` is a no.
pub struct TerminalConfirm;

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut answer).await {
            Ok(_) => is_affirmative(&answer),
            Err(_) => false,
        }
    }
}

/// Non-interactive runs (`--yes`).
pub struct AutoYes;

#[async_trait]
impl Confirm for AutoYes {
    async fn confirm(&self, question: &str) -> bool {
        log::info!("Auto-confirmed: {}", question);
        true
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
