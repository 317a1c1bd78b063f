use crate::archival::audit;
use crate::archival::config::{ArchivalConfig, NotificationLevel};
use crate::archival::detector::{CompletionStatus, SpecCompletionDetector};
use crate::archival::engine::{ArchivalEngine, spec_name_of};
use crate::archival::fsops::{ArchiveFs, LocalFs};
use crate::archival::index::ArchiveIndexManager;
use crate::archival::lock::ArchiveLock;
use crate::archival::paths::SpecPaths;
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecOutcome {
    /// Tasks remain open (or there are none yet).
    Incomplete,
    /// Complete, but touched within the delay window.
    PendingDelay,
    /// Complete and settled, but archival is switched off.
    Disabled,
    /// Dry run: would have been archived.
    WouldArchive,
    Archived,
    Failed,
}

impl SpecOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::PendingDelay => "pending-delay",
            Self::Disabled => "disabled",
            Self::WouldArchive => "would-archive",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecRunResult {
    pub spec_name: String,
    pub spec_path: PathBuf,
    pub outcome: SpecOutcome,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    pub warnings: Vec<String>,
}

impl SpecRunResult {
    fn new(spec_path: &Path, outcome: SpecOutcome, status: &CompletionStatus) -> Self {
        Self {
            spec_name: spec_name_of(spec_path),
            spec_path: spec_path.to_path_buf(),
            outcome,
            completed_tasks: status.completed_tasks,
            total_tasks: status.total_tasks,
            archive_path: None,
            error: None,
            error_code: None,
            warnings: Vec::new(),
        }
    }

    /// Whether this result is shown at `level`. Failures always are.
    pub fn reported_at(&self, level: NotificationLevel) -> bool {
        match level {
            NotificationLevel::Silent => self.outcome == SpecOutcome::Failed,
            NotificationLevel::Minimal => matches!(
                self.outcome,
                SpecOutcome::Archived | SpecOutcome::Failed | SpecOutcome::WouldArchive
            ),
            NotificationLevel::Verbose => true,
        }
    }

    pub fn line(&self) -> String {
        match self.outcome {
            SpecOutcome::Archived => {
                let dest = self
                    .archive_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                if self.warnings.is_empty() {
                    format!("archived {} -> {dest}", self.spec_name)
                } else {
                    format!(
                        "archived {} -> {dest} (degraded: {})",
                        self.spec_name,
                        self.warnings.join("; ")
                    )
                }
            }
            SpecOutcome::Failed => format!(
                "failed {}: {} {}",
                self.spec_name,
                self.error_code.unwrap_or("E010_IO"),
                self.error.as_deref().unwrap_or("unknown error")
            ),
            outcome => format!(
                "{} {} ({}/{} tasks)",
                outcome.as_str(),
                self.spec_name,
                self.completed_tasks,
                self.total_tasks
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchivalRunReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub enabled: bool,
    pub specs_dir: PathBuf,
    pub archive_root: PathBuf,
    pub results: Vec<SpecRunResult>,
}

impl ArchivalRunReport {
    pub fn count(&self, outcome: SpecOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(SpecOutcome::Failed) > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "scanned={} archived={} failed={} pending_delay={} incomplete={} disabled={} would_archive={}",
            self.results.len(),
            self.count(SpecOutcome::Archived),
            self.count(SpecOutcome::Failed),
            self.count(SpecOutcome::PendingDelay),
            self.count(SpecOutcome::Incomplete),
            self.count(SpecOutcome::Disabled),
            self.count(SpecOutcome::WouldArchive),
        )
    }

    /// Lines for the non-failed results shown at `level`, then the summary
    /// unless silent. Failures are reported separately by [`Self::failures`].
    pub fn render(&self, level: NotificationLevel) -> Vec<String> {
        let mut lines = self
            .results
            .iter()
            .filter(|r| r.outcome != SpecOutcome::Failed && r.reported_at(level))
            .map(SpecRunResult::line)
            .collect::<Vec<_>>();
        if level != NotificationLevel::Silent {
            lines.push(format!("summary {}", self.summary()));
        }
        lines
    }

    /// One line per failed spec; shown at every notification level.
    pub fn failures(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.outcome == SpecOutcome::Failed)
            .map(SpecRunResult::line)
            .collect()
    }
}

pub fn delay_window(minutes: u64) -> TimeDelta {
    i64::try_from(minutes)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX)
}

pub struct ArchivalOrchestrator<F: ArchiveFs = LocalFs> {
    paths: SpecPaths,
    config: ArchivalConfig,
    archive_root: PathBuf,
    detector: SpecCompletionDetector,
    engine: ArchivalEngine<F>,
}

impl ArchivalOrchestrator<LocalFs> {
    pub fn new(paths: SpecPaths, config: ArchivalConfig) -> Self {
        Self::with_fs(paths, config, LocalFs)
    }
}

impl<F: ArchiveFs> ArchivalOrchestrator<F> {
    pub fn with_fs(paths: SpecPaths, config: ArchivalConfig, fs: F) -> Self {
        let archive_root = paths.archive_root(&config.archive_location);
        let index = ArchiveIndexManager::new(&archive_root).with_backups(config.backup_enabled);
        Self {
            detector: SpecCompletionDetector::new().excluding(&archive_root),
            engine: ArchivalEngine::with_fs(index, fs),
            archive_root,
            paths,
            config,
        }
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn run(&mut self, dry_run: bool) -> Result<ArchivalRunReport> {
        self.run_at(Utc::now(), dry_run)
    }

    fn audit(&self, phase: &str, status: &str, spec: &str, message: &str) {
        audit::record(&self.archive_root, phase, status, spec, message);
    }

    /// One pass over every spec under the specs dir. Per-spec failures are
    /// recorded in the report and never abort the pass.
    pub fn run_at(&mut self, now: DateTime<Utc>, dry_run: bool) -> Result<ArchivalRunReport> {
        let mutating = self.config.enabled && !dry_run;
        let _lock = if mutating {
            Some(ArchiveLock::acquire(&self.archive_root)?)
        } else {
            None
        };

        let window = delay_window(self.config.delay_minutes);
        let specs = self.detector.list_specs(&self.paths.specs_dir)?;
        let mut results = Vec::with_capacity(specs.len());

        for spec in specs {
            let status = match self.detector.check_spec_completion(&spec) {
                Ok(status) => status,
                Err(err) => {
                    let mut result =
                        SpecRunResult::new(&spec, SpecOutcome::Failed, &CompletionStatus::absent());
                    result.error = Some(err.to_string());
                    result.error_code = Some(err.code().as_str());
                    results.push(result);
                    continue;
                }
            };

            let outcome = if !status.is_complete {
                SpecOutcome::Incomplete
            } else if status.modified_within(window, now) {
                SpecOutcome::PendingDelay
            } else if !self.config.enabled {
                SpecOutcome::Disabled
            } else if dry_run {
                SpecOutcome::WouldArchive
            } else {
                SpecOutcome::Archived
            };

            let mut result = SpecRunResult::new(&spec, outcome, &status);
            if outcome == SpecOutcome::Archived {
                let archived = self.engine.archive_spec(&spec);
                result.warnings = archived.warnings;
                if archived.success {
                    result.archive_path = archived.archive_path;
                    let dest = result
                        .archive_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    self.audit(
                        "archive",
                        if result.warnings.is_empty() { "ok" } else { "degraded" },
                        &result.spec_name,
                        &format!("archive={dest} tasks={}", status.total_tasks),
                    );
                } else {
                    result.outcome = SpecOutcome::Failed;
                    result.error = archived.error;
                    result.error_code = archived.error_code;
                    self.audit(
                        "archive",
                        "failed",
                        &result.spec_name,
                        &format!(
                            "code={} error={}",
                            result.error_code.unwrap_or("E010_IO"),
                            result.error.as_deref().unwrap_or_default()
                        ),
                    );
                }
            }
            results.push(result);
        }

        let report = ArchivalRunReport {
            started_at: now,
            dry_run,
            enabled: self.config.enabled,
            specs_dir: self.paths.specs_dir.clone(),
            archive_root: self.archive_root.clone(),
            results,
        };
        if mutating {
            self.audit(
                "run",
                if report.has_failures() { "degraded" } else { "ok" },
                "",
                &report.summary(),
            );
        }
        Ok(report)
    }
}
