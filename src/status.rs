//! The status dashboard: a read-only summary over policy and audit log.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::audit::{read_records, AuditKind, AuditRecord};
use crate::policy::PolicyStore;

/// Number of recent audit events shown.
const RECENT_EVENTS: usize = 5;

/// Aggregated view of the policy and the audit history.
#[derive(Debug)]
pub struct StatusReport {
    /// Unique registered images, counted by digest.
    pub registered_images: usize,
    /// Total `ALLOWED` audit records.
    pub allowed: usize,
    /// Total `BLOCKED` audit records.
    pub blocked: usize,
    /// The most recent audit records, newest first.
    pub last_events: Vec<AuditRecord>,
}

impl StatusReport {
    /// Build the report from whatever is on disk.
    ///
    /// Tolerant by design: a missing or corrupt policy counts as empty, and
    /// malformed audit lines are skipped.
    pub fn build(policy_path: &Path, audit_path: &Path) -> Self {
        let (policy, _advisories) = PolicyStore::load(policy_path);
        let records = read_records(audit_path);

        // Entries are keyed by both tag and digest; dedupe through the digest
        // field, falling back to the key for legacy entries.
        let mut digests: HashSet<&str> = HashSet::new();
        for (key, entry) in policy.entries() {
            digests.insert(entry.digest.as_deref().unwrap_or(key));
        }

        let allowed = records
            .iter()
            .filter(|record| record.event == AuditKind::Allowed)
            .count();
        let blocked = records
            .iter()
            .filter(|record| record.event == AuditKind::Blocked)
            .count();

        let mut last_events = records;
        last_events.sort_by_key(|record| std::cmp::Reverse(parse_time(&record.timestamp)));
        last_events.truncate(RECENT_EVENTS);

        Self {
            registered_images: digests.len(),
            allowed,
            blocked,
            last_events,
        }
    }

    /// Render the report as plain text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== Portcullis Status ==");
        let _ = writeln!(out, "Registered images: {}", self.registered_images);
        let _ = writeln!(out, "Allowed containers: {}", self.allowed);
        let _ = writeln!(out, "Blocked containers: {}", self.blocked);
        let _ = writeln!(out);
        let _ = writeln!(out, "Last {RECENT_EVENTS} events:");
        if self.last_events.is_empty() {
            let _ = writeln!(out, "(no events yet)");
        } else {
            for record in &self.last_events {
                let event = match record.event {
                    AuditKind::Created => "CREATED",
                    AuditKind::Allowed => "ALLOWED",
                    AuditKind::Blocked => "BLOCKED",
                };
                let _ = writeln!(
                    out,
                    "{} {:<7} {} {} - {}",
                    record.timestamp,
                    event,
                    record.container_id,
                    record.image.as_deref().unwrap_or("?"),
                    record.message
                );
            }
        }
        out
    }
}

/// Parse an audit timestamp, sorting unparsable ones to the distant past.
fn parse_time(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
