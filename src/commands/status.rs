use anyhow::Result;
use std::env;

use crate::archival::detector::SpecCompletionDetector;
use crate::archival::lock::ArchiveLock;
use crate::commands::{CommandReport, Workspace};

mod env_allowlist {
    include!(concat!(env!("OUT_DIR"), "/spec_archive_env_allowlist.rs"));
}

const ENV_PREFIX: &str = "SPEC_ARCHIVE_";

/// `SPEC_ARCHIVE_*` names that nothing in this binary reads; usually typos.
fn unknown_env_keys(keys: impl IntoIterator<Item = String>, allowlist: &[&str]) -> Vec<String> {
    let mut unknown = keys
        .into_iter()
        .filter(|key| key.starts_with(ENV_PREFIX) && !allowlist.contains(&key.as_str()))
        .collect::<Vec<_>>();
    unknown.sort();
    unknown
}

/// Read-only overview; never creates the archive root or index.
pub fn run(ws: &Workspace) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let archive_root = ws.archive_root();
    let mut index = ws.index_manager();
    let index_path = index.index_path().to_path_buf();

    report.detail(format!("project_root={}", ws.paths.project_root.display()));
    report.detail(format!("specs_dir={}", ws.paths.specs_dir.display()));
    report.detail(format!("config_file={}", ws.paths.config_file.display()));
    report.detail(format!("config_file.exists={}", ws.paths.config_file.exists()));
    report.detail(format!("archive_root={}", archive_root.display()));
    report.detail(format!("index_file.exists={}", index_path.exists()));
    report.detail(format!("enabled={}", ws.config.enabled));
    report.detail(format!("delay_minutes={}", ws.config.delay_minutes));

    if ws.paths.specs_dir.is_dir() {
        let detector = SpecCompletionDetector::new().excluding(&archive_root);
        match detector.list_specs(&ws.paths.specs_dir) {
            Ok(specs) => report.detail(format!("specs={}", specs.len())),
            Err(err) => report.archival_issue(&err),
        }
        match detector.get_all_completed_specs(&ws.paths.specs_dir) {
            Ok(done) => report.detail(format!("complete_specs={}", done.len())),
            Err(err) => report.archival_issue(&err),
        }
    } else {
        report.detail("specs_dir.exists=false");
    }

    if index_path.exists() {
        match index.get_archive_stats() {
            Ok(stats) => report.detail(format!("archives={}", stats.total_archives)),
            Err(err) => report.archival_issue(&err),
        }
    }

    if let Some(holder) = ArchiveLock::holder(&archive_root) {
        report.detail(format!(
            "last_lock_holder=pid:{} started_at:{}",
            holder.pid,
            holder.started_at.to_rfc3339()
        ));
    }

    let unknown = unknown_env_keys(
        env::vars().map(|(key, _)| key),
        env_allowlist::GENERATED_SPEC_ARCHIVE_ENV_ALLOWLIST,
    );
    for key in unknown {
        report.issue(format!("unrecognized environment variable {key}"));
    }

    Ok(report)
}
