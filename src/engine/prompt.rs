//! Interactive confirmation
//!
//! Steps that mutate irreversible state ask a [`Confirm`] implementation
//! before acting, so tests can answer for the user.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

#[async_trait]
pub trait Confirm: Send + Sync {
    /// Ask a yes/no question; anything but an explicit yes is a no
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on the terminal: `<prompt> (y/N)`
#[derive(Debug, Clone, Default)]
pub struct TerminalConfirm;

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = tokio::io::stderr();
        if stderr
            .write_all(format!("{} (y/N) ", prompt).as_bytes())
            .await
            .is_err()
        {
            return false;
        }
        let _ = stderr.flush().await;

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(e) => {
                warn!("Failed to read confirmation: {}", e);
                false
            }
        }
    }
}

/// Answers yes to everything (`--yes`)
#[derive(Debug, Clone, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
