use anyhow::Result;
use chrono::Utc;

use crate::archival::detector::{CompletionStatus, SpecCompletionDetector};
use crate::archival::engine::ArchivalEngine;
use crate::archival::orchestrator::delay_window;
use crate::archival::tasks;
use crate::commands::{CommandReport, Workspace};
use crate::error::ArchivalError;

/// Completion status of one spec plus whether it could be archived right now.
pub fn run(ws: &Workspace, spec: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("check");
    let spec_path = ws.resolve_spec(spec);
    report.detail(format!("spec={}", spec_path.display()));

    if !spec_path.is_dir() {
        report.archival_issue(&ArchivalError::SpecNotFound(spec_path));
        return Ok(report);
    }

    let detector = SpecCompletionDetector::new().excluding(ws.archive_root());
    let inspection = match detector.inspect(&spec_path) {
        Ok(inspection) => inspection,
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    };
    let Some(inspection) = inspection else {
        report.detail("tasks_document=missing");
        report.detail("complete=false");
        return Ok(report);
    };

    let doc = &inspection.document;
    let status = CompletionStatus::from_document(doc, Some(inspection.last_modified));
    report.detail(format!("tasks.total={}", status.total_tasks));
    report.detail(format!("tasks.completed={}", status.completed_tasks));
    report.detail(format!("tasks.in_progress={}", status.in_progress_tasks));
    report.detail(format!("complete={}", status.is_complete));
    report.detail(format!(
        "last_modified={}",
        inspection.last_modified.to_rfc3339()
    ));

    let settled = !status.modified_within(delay_window(ws.config.delay_minutes), Utc::now());
    report.detail(format!("delay_elapsed={settled}"));

    for line in &doc.malformed_lines {
        report.detail(format!("malformed: {line}"));
    }
    for warning in tasks::validate_task_references(&doc.tasks) {
        report.detail(format!("warning: {warning}"));
    }

    let engine = ArchivalEngine::new(ws.index_manager());
    let safety = engine.validate_archival_safety(&spec_path);
    report.detail(format!("archivable={}", safety.safe));
    for failure in &safety.failures {
        report.detail(format!("blocked: {}: {failure}", failure.code().as_str()));
    }
    Ok(report)
}
