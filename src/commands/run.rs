use anyhow::Result;

use crate::archival::config::NotificationLevel;
use crate::archival::orchestrator::ArchivalOrchestrator;
use crate::commands::{CommandReport, Workspace};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

pub fn run(ws: &Workspace, opts: &RunOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("run");
    let level = ws.config.notification_level;

    let mut orchestrator = ArchivalOrchestrator::new(ws.paths.clone(), ws.config.clone());
    let pass = match orchestrator.run(opts.dry_run) {
        Ok(pass) => pass,
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    };

    if level == NotificationLevel::Verbose {
        report.detail(format!("specs_dir={}", pass.specs_dir.display()));
        report.detail(format!("archive_root={}", pass.archive_root.display()));
        report.detail(format!("enabled={}", pass.enabled));
        report.detail(format!("dry_run={}", pass.dry_run));
    }

    for line in pass.render(level) {
        report.detail(line);
    }
    for failure in pass.failures() {
        report.issue(failure);
    }
    Ok(report)
}
