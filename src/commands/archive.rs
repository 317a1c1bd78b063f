use anyhow::Result;

use crate::archival::audit;
use crate::archival::engine::ArchivalEngine;
use crate::archival::lock::ArchiveLock;
use crate::commands::{CommandReport, Workspace};

/// Archive one spec immediately. The delay window and the `enabled` switch
/// only govern `run`.
pub fn run(ws: &Workspace, spec: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("archive");
    let spec_path = ws.resolve_spec(spec);
    let archive_root = ws.archive_root();

    let _lock = match ArchiveLock::acquire(&archive_root) {
        Ok(lock) => lock,
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    };

    let mut engine = ArchivalEngine::new(ws.index_manager());
    let result = engine.archive_spec(&spec_path);

    if !result.success {
        let code = result.error_code.unwrap_or("E010_IO");
        let error = result.error.unwrap_or_default();
        audit::record(
            &archive_root,
            "archive",
            "failed",
            &result.spec_name,
            &format!("code={code} error={error}"),
        );
        report.issue(format!("{code}: {error}"));
        return Ok(report);
    }

    let dest = result
        .archive_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    audit::record(
        &archive_root,
        "archive",
        if result.is_degraded() { "degraded" } else { "ok" },
        &result.spec_name,
        &format!("archive={dest} indexed={}", result.index_updated),
    );

    report.detail(format!("archived {} -> {dest}", result.spec_name));
    report.detail(format!("indexed={}", result.index_updated));
    if let Some(meta) = &result.metadata {
        report.detail(format!("total_tasks={}", meta.total_tasks));
    }
    for warning in &result.warnings {
        report.detail(format!("warning: {warning}"));
    }
    Ok(report)
}
