use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::archival::audit;
use crate::archival::index::{ArchiveIndexEntry, ArchiveIndexManager};
use crate::archival::lock::ArchiveLock;
use crate::commands::{CommandReport, Workspace};

#[derive(Debug, Clone)]
pub enum IndexAction {
    List,
    Search { term: String },
    Show { spec: String },
    Stats,
    Repair,
    Remove { archive_path: String, purge: bool },
}

fn entry_line(entry: &ArchiveIndexEntry) -> String {
    format!(
        "{} archived={} completed={} tasks={} path={}",
        entry.spec_name,
        entry.archival_date.to_rfc3339(),
        entry.completion_date.to_rfc3339(),
        entry.total_tasks,
        entry.archive_path
    )
}

pub fn run(ws: &Workspace, action: &IndexAction) -> Result<CommandReport> {
    let mut manager = ws.index_manager();
    match action {
        IndexAction::List => list(&mut manager),
        IndexAction::Search { term } => search(&mut manager, term),
        IndexAction::Show { spec } => show(&mut manager, spec),
        IndexAction::Stats => stats(&mut manager),
        IndexAction::Repair => repair(&mut manager),
        IndexAction::Remove {
            archive_path,
            purge,
        } => remove(&mut manager, archive_path, *purge),
    }
}

fn list(manager: &mut ArchiveIndexManager) -> Result<CommandReport> {
    let mut report = CommandReport::new("index list");
    match manager.get_index() {
        Ok(index) => {
            report.detail(format!("archives={}", index.archives.len()));
            for entry in &index.archives {
                report.detail(entry_line(entry));
            }
        }
        Err(err) => report.archival_issue(&err),
    }
    Ok(report)
}

fn search(manager: &mut ArchiveIndexManager, term: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("index search");
    match manager.search_archives(term) {
        Ok(hits) => {
            report.detail(format!("matches={}", hits.len()));
            for entry in &hits {
                report.detail(entry_line(entry));
            }
        }
        Err(err) => report.archival_issue(&err),
    }
    Ok(report)
}

fn show(manager: &mut ArchiveIndexManager, spec: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("index show");
    match manager.get_archive_by_spec_name(spec) {
        Ok(Some(entry)) => {
            report.detail(format!("spec_name={}", entry.spec_name));
            report.detail(format!("archive_path={}", entry.archive_path));
            report.detail(format!("original_path={}", entry.original_path));
            report.detail(format!("completion_date={}", entry.completion_date.to_rfc3339()));
            report.detail(format!("archival_date={}", entry.archival_date.to_rfc3339()));
            report.detail(format!("total_tasks={}", entry.total_tasks));
        }
        Ok(None) => report.issue(format!("no archive found for spec {spec}")),
        Err(err) => report.archival_issue(&err),
    }
    Ok(report)
}

fn stats(manager: &mut ArchiveIndexManager) -> Result<CommandReport> {
    let mut report = CommandReport::new("index stats");
    match manager.get_archive_stats() {
        Ok(stats) => {
            report.detail(format!("total_archives={}", stats.total_archives));
            report.detail(format!("total_tasks={}", stats.total_tasks));
            if let Some(oldest) = stats.oldest_archive {
                report.detail(format!("oldest_archive={}", oldest.to_rfc3339()));
            }
            if let Some(newest) = stats.newest_archive {
                report.detail(format!("newest_archive={}", newest.to_rfc3339()));
            }
        }
        Err(err) => report.archival_issue(&err),
    }
    Ok(report)
}

fn repair(manager: &mut ArchiveIndexManager) -> Result<CommandReport> {
    let mut report = CommandReport::new("index repair");
    let archive_root = manager.archive_root().to_path_buf();
    let _lock = match ArchiveLock::acquire(&archive_root) {
        Ok(lock) => lock,
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    };

    let outcome = manager.validate_and_repair_index();
    audit::record(
        &archive_root,
        "repair",
        if outcome.repaired || outcome.is_valid { "ok" } else { "failed" },
        "",
        &format!(
            "valid={} repaired={} issues={}",
            outcome.is_valid,
            outcome.repaired,
            outcome.issues.len()
        ),
    );

    report.detail(format!("valid={}", outcome.is_valid));
    report.detail(format!("repaired={}", outcome.repaired));
    for issue in &outcome.issues {
        report.detail(format!("fixed: {issue}"));
    }
    if !outcome.is_valid && !outcome.repaired {
        report.issue("index needs manual attention");
    }
    Ok(report)
}

fn remove(manager: &mut ArchiveIndexManager, archive_path: &str, purge: bool) -> Result<CommandReport> {
    let mut report = CommandReport::new("index remove");
    let archive_root = manager.archive_root().to_path_buf();
    let _lock = match ArchiveLock::acquire(&archive_root) {
        Ok(lock) => lock,
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    };

    if let Ok(Some(entry)) = manager.get_archive_by_path(archive_path) {
        report.detail(format!("spec_name={}", entry.spec_name));
    }
    match manager.remove_archive_entry(archive_path) {
        Ok(true) => report.detail(format!("removed entry {archive_path}")),
        Ok(false) => {
            report.issue(format!("no index entry for {archive_path}"));
            return Ok(report);
        }
        Err(err) => {
            report.archival_issue(&err);
            return Ok(report);
        }
    }

    let dir = Path::new(archive_path);
    if purge {
        if dir.starts_with(&archive_root) && dir.is_dir() {
            fs::remove_dir_all(dir)
                .with_context(|| format!("failed to delete {}", dir.display()))?;
            report.detail(format!("deleted {}", dir.display()));
        } else {
            report.issue(format!(
                "refusing to delete {} (not a directory under {})",
                dir.display(),
                archive_root.display()
            ));
        }
    } else if dir.is_dir() {
        report.detail("archive directory kept; `index repair` will re-register it unless deleted");
    }
    audit::record(
        &archive_root,
        "remove",
        "ok",
        "",
        &format!("archive={archive_path} purge={purge}"),
    );
    Ok(report)
}
