use crate::archival::paths;
use crate::archival::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub phase: String,
    pub status: String,
    pub spec: String,
    pub message: String,
}

pub fn append_event(
    archive_root: &Path,
    phase: &str,
    status: &str,
    spec: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(archive_root)
        .with_context(|| format!("failed to create {}", archive_root.display()))?;
    let event = AuditEvent {
        at: Utc::now(),
        phase: phase.to_string(),
        status: status.to_string(),
        spec: spec.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths::audit_path(archive_root);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Append an event, downgrading a write failure to an `AUDIT_WRITE_FAILED`
/// warning. The audit trail never decides whether an action succeeded.
pub fn record(archive_root: &Path, phase: &str, status: &str, spec: &str, message: &str) -> bool {
    match append_event(archive_root, phase, status, spec, message) {
        Ok(()) => true,
        Err(err) => {
            warn::emit(WarnEvent {
                code: "AUDIT_WRITE_FAILED",
                stage: "audit",
                action: phase,
                spec,
                path: &paths::audit_path(archive_root).display().to_string(),
                reason: "audit-log-unwritable",
                err: &format!("{err:#}"),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_jsonl() {
        let tmp = tempdir().expect("tempdir");
        append_event(tmp.path(), "archive", "ok", "foo", "archived").expect("first");
        append_event(tmp.path(), "repair", "ok", "", "issues=0").expect("second");

        let raw = fs::read_to_string(paths::audit_path(tmp.path())).expect("read");
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["phase"], "archive");
        assert_eq!(first["spec"], "foo");
    }

    #[test]
    fn record_survives_unwritable_log() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(paths::audit_path(tmp.path())).expect("block audit path");
        assert!(!record(tmp.path(), "archive", "ok", "foo", "archived"));
        assert!(record(&tmp.path().join("fresh"), "archive", "ok", "foo", "archived"));
    }
}
