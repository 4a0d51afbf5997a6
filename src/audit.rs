//! Append-only audit log of admission decisions.
//!
//! Writes structured JSON entries, one per line, to an append-only sink.
//! Nothing in the monitor reads the log back; the `status` subcommand and
//! downstream tooling consume it later. Append failures are reported to the
//! caller but must never interrupt monitoring.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Audit event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    /// A container was created.
    #[serde(rename = "CREATED")]
    Created,
    /// A container's image was admitted.
    #[serde(rename = "ALLOWED")]
    Allowed,
    /// A container's image was refused.
    #[serde(rename = "BLOCKED")]
    Blocked,
}

/// A single audit log entry.
///
/// `image` and `digest` stay nullable rather than skipped so every line
/// carries the same six fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC timestamp, second precision, `Z` suffix.
    pub timestamp: String,
    /// What happened.
    pub event: AuditKind,
    /// Container the event refers to.
    pub container_id: String,
    /// Human image tag, when one was resolved.
    pub image: Option<String>,
    /// Free-text detail.
    pub message: String,
    /// Image content digest, when one was resolved.
    pub digest: Option<String>,
}

/// Audit logger writing structured JSON lines to an append-only sink.
pub struct AuditLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    /// Create an audit log that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for append.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Create an audit log from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Append one record as a single JSON line and flush it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails; callers log a
    /// warning and keep monitoring.
    pub fn record(
        &self,
        event: AuditKind,
        container_id: &str,
        image: Option<&str>,
        message: &str,
        digest: Option<&str>,
    ) -> anyhow::Result<()> {
        let record = AuditRecord {
            timestamp: utc_timestamp(),
            event,
            container_id: container_id.to_owned(),
            image: image.map(ToOwned::to_owned),
            message: message.to_owned(),
            digest: digest.map(ToOwned::to_owned),
        };
        let line = serde_json::to_string(&record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Current time as a second-precision UTC timestamp with `Z` suffix.
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read every parsable record from an audit log.
///
/// Blank and malformed lines are skipped; a missing or unreadable file yields
/// an empty list. The dashboard must work against whatever is on disk.
pub fn read_records(path: &Path) -> Vec<AuditRecord> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            serde_json::from_str::<AuditRecord>(trimmed).ok()
        })
        .collect()
}
