//! Structured logging module for Echo
//!
//! Console output always; daily rolling files when a log directory is
//! configured. Every line carries a category:
//! - CONVERSATION: endpoint request lifecycle
//! - CLASSIFY: emotion detection and suggestion picks
//! - PROVIDER: completion provider traffic
//! - STORAGE: local persistence reads and writes
//! - SHELL: application shell transitions
//! - ERROR: failures

use chrono::Utc;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{EchoError, Result};

const LOG_FILE_PREFIX: &str = "echo.log";
const LOG_RETENTION_DAYS: i64 = 7;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Conversation,
    Classify,
    Provider,
    Storage,
    Shell,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Classify => "CLASSIFY",
            LogCategory::Provider => "PROVIDER",
            LogCategory::Storage => "STORAGE",
            LogCategory::Shell => "SHELL",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Keeps the file writer flushing for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Install the global subscriber. Filter comes from `ECHO_LOG`, then `RUST_LOG`, then `info`.
pub fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env("ECHO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().with_ansi(false).with_target(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| EchoError::Config(format!("logging already initialized: {}", e)))?;

    log(LogCategory::Conversation, None, "Echo logging initialized");
    Ok(())
}

/// `conversation=abcdef12 | ` prefix, empty when there is no conversation
fn conversation_context(conversation_id: Option<&str>) -> String {
    conversation_id
        .map(|id| format!("conversation={} | ", id.chars().take(8).collect::<String>()))
        .unwrap_or_default()
}

/// Log a message with category and optional conversation context
pub fn log(category: LogCategory, conversation_id: Option<&str>, message: &str) {
    let context = conversation_context(conversation_id);
    match category {
        LogCategory::Error => {
            tracing::error!(category = category.as_str(), "{}{}", context, message)
        }
        _ => tracing::info!(category = category.as_str(), "{}{}", context, message),
    }
}

/// Log an endpoint request lifecycle event
pub fn log_conversation(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Conversation, conversation_id, message);
}

/// Log a classification outcome
pub fn log_classify(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Classify, conversation_id, message);
}

/// Log completion provider traffic
pub fn log_provider(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Provider, conversation_id, message);
}

/// Log a storage event
pub fn log_storage(message: &str) {
    log(LogCategory::Storage, None, message);
}

/// Log a shell transition
pub fn log_shell(message: &str) {
    log(LogCategory::Shell, None, message);
}

/// Log an error
pub fn log_error(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Error, conversation_id, message);
}

/// Clean up log files older than the retention window
pub fn cleanup_old_logs(log_dir: &Path) -> Result<usize> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(LOG_RETENTION_DAYS);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_context_is_shortened() {
        assert_eq!(
            conversation_context(Some("0123456789abcdef")),
            "conversation=01234567 | "
        );
        assert_eq!(conversation_context(Some("abc")), "conversation=abc | ");
        assert_eq!(conversation_context(None), "");
    }

    #[test]
    fn test_cleanup_keeps_fresh_logs_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("echo.log.2026-10-19"), "fresh").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a log").unwrap();

        let deleted = cleanup_old_logs(dir.path()).unwrap();

        assert_eq!(deleted, 0);
        assert!(dir.path().join("echo.log.2026-10-19").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("missing")).unwrap(), 0);
    }
}
