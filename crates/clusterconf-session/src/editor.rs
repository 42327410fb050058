//! User interaction seams
//!
//! The edit workflow hands a document to an [`Editor`] and asks a
//! [`Confirm`] before submitting. Both are traits so tests can script them.

use crate::error::SessionError;
use async_trait::async_trait;
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Lets the user modify a document
#[async_trait]
pub trait Editor: Send + Sync {
    /// Present `text` and return what the user saved
    async fn edit(&self, text: &str) -> Result<String, SessionError>;
}

/// Asks the user a yes/no question
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Show `prompt` and return the answer
    async fn confirm(&self, prompt: &str) -> Result<bool, SessionError>;
}

/// Runs `$VISUAL`, `$EDITOR` or `vi` on a scratch file
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    /// Editor with an explicit command line, e.g. `"code --wait"`
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Editor chosen from the environment
    #[must_use]
    pub fn from_env() -> Self {
        let command = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .ok()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string());
        Self::new(command)
    }
}

#[async_trait]
impl Editor for ExternalEditor {
    async fn edit(&self, text: &str) -> Result<String, SessionError> {
        let mut file = tempfile::Builder::new()
            .prefix("clusterconf-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| SessionError::io(std::env::temp_dir(), e))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| SessionError::io(file.path(), e))?;

        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SessionError::Editor("empty editor command".to_string()))?;

        tracing::debug!(editor = %self.command, path = %file.path().display(), "launching editor");
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(file.path())
            .status()
            .await
            .map_err(|e| SessionError::Editor(format!("{program}: {e}")))?;
        if !status.success() {
            return Err(SessionError::Editor(format!("{program} exited with {status}")));
        }

        tokio::fs::read_to_string(file.path())
            .await
            .map_err(|e| SessionError::io(file.path(), e))
    }
}

/// Confirms everything without asking
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _prompt: &str) -> Result<bool, SessionError> {
        Ok(true)
    }
}

/// Prompts on stderr and reads the answer from stdin
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> Result<bool, SessionError> {
        eprint!("{prompt} [y/N] ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::io("<stdin>", e))?;
        Ok(is_yes(&line))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[tokio::test]
    async fn assume_yes_confirms() {
        assert!(AssumeYes.confirm("apply?").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_editor_round_trips_file() {
        // `true` leaves the file untouched
        let editor = ExternalEditor::new("true");
        let text = editor.edit("a: 1\n").await.unwrap();
        assert_eq!(text, "a: 1\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_editor_is_reported() {
        let editor = ExternalEditor::new("false");
        assert!(matches!(editor.edit("a: 1\n").await, Err(SessionError::Editor(_))));
    }
}
