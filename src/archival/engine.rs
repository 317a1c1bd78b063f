use crate::archival::detector::{CompletionStatus, SpecCompletionDetector};
use crate::archival::fsops::{self, ArchiveFs, LocalFs};
use crate::archival::index::{
    ArchiveIndexManager, ArchiveMetadata, INDEX_VERSION, STAGING_PREFIX,
};
use crate::archival::paths::{METADATA_FILE, REQUIRED_DOCS, TASKS_DOC};
use crate::archival::warn::{self, WarnEvent};
use crate::error::{ArchivalError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct ArchivalResult {
    pub success: bool,
    pub spec_name: String,
    pub original_path: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Non-fatal problems after the archive was safely written.
    pub warnings: Vec<String>,
    pub index_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ArchiveMetadata>,
}

impl ArchivalResult {
    fn failed(spec_name: &str, spec_path: &Path, timestamp: DateTime<Utc>, err: &ArchivalError) -> Self {
        Self {
            success: false,
            spec_name: spec_name.to_string(),
            original_path: spec_path.to_path_buf(),
            archive_path: None,
            timestamp,
            error: Some(err.to_string()),
            error_code: Some(err.code().as_str()),
            warnings: Vec::new(),
            index_updated: false,
            metadata: None,
        }
    }

    /// Archived on disk, but the original lingered or the index lags behind.
    pub fn is_degraded(&self) -> bool {
        self.success && !self.warnings.is_empty()
    }
}

#[derive(Debug)]
pub struct SafetyCheck {
    pub safe: bool,
    pub status: Option<CompletionStatus>,
    pub failures: Vec<ArchivalError>,
}

/// What the engine knows about a spec at the moment it is archived.
#[derive(Debug, Clone)]
pub struct SpecInfo {
    pub spec_name: String,
    pub original_path: PathBuf,
    pub archive_path: PathBuf,
    pub completion_date: DateTime<Utc>,
    pub archival_date: DateTime<Utc>,
    pub total_tasks: usize,
}

pub fn spec_name_of(spec_path: &Path) -> String {
    spec_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("spec")
        .to_string()
}

pub struct ArchivalEngine<F: ArchiveFs = LocalFs> {
    archive_root: PathBuf,
    detector: SpecCompletionDetector,
    index: ArchiveIndexManager,
    fs: F,
}

impl ArchivalEngine<LocalFs> {
    pub fn new(index: ArchiveIndexManager) -> Self {
        Self::with_fs(index, LocalFs)
    }
}

impl<F: ArchiveFs> ArchivalEngine<F> {
    pub fn with_fs(index: ArchiveIndexManager, fs: F) -> Self {
        let archive_root = index.archive_root().to_path_buf();
        Self {
            detector: SpecCompletionDetector::new().excluding(&archive_root),
            archive_root,
            index,
            fs,
        }
    }

    #[cfg(test)]
    pub fn index(&mut self) -> &mut ArchiveIndexManager {
        &mut self.index
    }

    fn is_inside_archive(&self, spec_path: &Path) -> bool {
        let (Ok(spec), Ok(root)) = (
            spec_path.canonicalize(),
            self.archive_root.canonicalize(),
        ) else {
            return spec_path.starts_with(&self.archive_root);
        };
        spec.starts_with(root)
    }

    pub fn validate_archival_safety(&self, spec_path: &Path) -> SafetyCheck {
        let spec_name = spec_name_of(spec_path);
        let mut failures = Vec::new();

        if !spec_path.is_dir() {
            failures.push(ArchivalError::SpecNotFound(spec_path.to_path_buf()));
            return SafetyCheck {
                safe: false,
                status: None,
                failures,
            };
        }

        let missing = REQUIRED_DOCS
            .iter()
            .filter(|doc| !spec_path.join(doc).is_file())
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            failures.push(ArchivalError::MissingDocuments {
                spec: spec_name.clone(),
                missing: missing.join(", "),
            });
        }

        if self.is_inside_archive(spec_path) {
            failures.push(ArchivalError::AlreadyArchived(spec_path.to_path_buf()));
        }

        let status = match self.detector.check_spec_completion(spec_path) {
            Ok(status) => {
                if !status.is_complete {
                    failures.push(ArchivalError::Incomplete {
                        spec: spec_name,
                        completed: status.completed_tasks,
                        total: status.total_tasks,
                    });
                }
                Some(status)
            }
            Err(err) => {
                failures.push(err);
                None
            }
        };

        SafetyCheck {
            safe: failures.is_empty(),
            status,
            failures,
        }
    }

    pub fn create_archive_metadata(&self, info: &SpecInfo) -> ArchiveMetadata {
        let absolute =
            |path: &Path| std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        ArchiveMetadata {
            spec_name: info.spec_name.clone(),
            original_path: absolute(&info.original_path).display().to_string(),
            archive_path: absolute(&info.archive_path).display().to_string(),
            completion_date: info.completion_date,
            archival_date: info.archival_date,
            total_tasks: info.total_tasks,
            version: INDEX_VERSION.to_string(),
        }
    }

    /// `<stamp>_<name>`, suffixed `-2`, `-3`, ... if a same-second archive exists.
    fn destination(&self, spec_name: &str, at: DateTime<Utc>) -> PathBuf {
        let base = format!("{}_{spec_name}", at.format("%Y%m%dT%H%M%SZ"));
        let mut candidate = self.archive_root.join(&base);
        let mut n = 2;
        while candidate.exists() || self.staging_for(&candidate).exists() {
            candidate = self.archive_root.join(format!("{base}-{n}"));
            n += 1;
        }
        candidate
    }

    fn staging_for(&self, destination: &Path) -> PathBuf {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.archive_root.join(format!("{STAGING_PREFIX}{name}"))
    }

    /// Copy into `staging`, verify every file and symlink against its source,
    /// then drop the metadata file in.
    fn stage(&self, spec_path: &Path, staging: &Path, metadata: &ArchiveMetadata) -> Result<()> {
        let copied = fsops::copy_tree(&self.fs, spec_path, staging).map_err(|source| {
            ArchivalError::CopyFailed {
                path: staging.to_path_buf(),
                source,
            }
        })?;

        if !copied.files.iter().any(|rel| rel == Path::new(TASKS_DOC)) {
            return Err(ArchivalError::VerificationFailed {
                path: staging.join(TASKS_DOC),
            });
        }
        for rel in &copied.links {
            let copy = staging.join(rel);
            let matches = match (fs::read_link(spec_path.join(rel)), fs::read_link(&copy)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !matches {
                return Err(ArchivalError::VerificationFailed { path: copy });
            }
        }
        for rel in &copied.files {
            let copy = staging.join(rel);
            let matches = match (fsops::file_hash(&spec_path.join(rel)), fsops::file_hash(&copy)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !matches {
                return Err(ArchivalError::VerificationFailed { path: copy });
            }
        }

        let data = serde_json::to_string_pretty(metadata)
            .map_err(|err| ArchivalError::configuration(staging.join(METADATA_FILE), err))?;
        let meta_path = staging.join(METADATA_FILE);
        fsops::atomic_write(&meta_path, format!("{data}\n").as_bytes())
            .map_err(|source| ArchivalError::CopyFailed {
                path: meta_path,
                source,
            })
    }

    fn emit_warning(code: &str, action: &str, spec: &str, path: &Path, reason: &str, err: &str) {
        warn::emit(WarnEvent {
            code,
            stage: "archive",
            action,
            spec,
            path: &path.display().to_string(),
            reason,
            err,
        });
    }

    /// Archive one spec. `success == false` always leaves the original untouched.
    pub fn archive_spec(&mut self, spec_path: &Path) -> ArchivalResult {
        let timestamp = Utc::now();
        let spec_name = spec_name_of(spec_path);

        let check = self.validate_archival_safety(spec_path);
        if let Some(err) = check.failures.first() {
            return ArchivalResult::failed(&spec_name, spec_path, timestamp, err);
        }
        let status = check.status.unwrap_or_else(CompletionStatus::absent);

        if let Err(err) = self.fs.create_dir_all(&self.archive_root) {
            let err = ArchivalError::CopyFailed {
                path: self.archive_root.clone(),
                source: err,
            };
            return ArchivalResult::failed(&spec_name, spec_path, timestamp, &err);
        }

        let destination = self.destination(&spec_name, timestamp);
        let staging = self.staging_for(&destination);
        let metadata = self.create_archive_metadata(&SpecInfo {
            spec_name: spec_name.clone(),
            original_path: spec_path.to_path_buf(),
            archive_path: destination.clone(),
            completion_date: status.last_modified.unwrap_or(timestamp),
            archival_date: timestamp,
            total_tasks: status.total_tasks,
        });

        let staged = self.stage(spec_path, &staging, &metadata).and_then(|()| {
            self.fs
                .rename(&staging, &destination)
                .map_err(|source| ArchivalError::CopyFailed {
                    path: destination.clone(),
                    source,
                })
        });
        if let Err(err) = staged {
            if staging.exists() {
                let _ = self.fs.remove_dir_all(&staging);
            }
            return ArchivalResult::failed(&spec_name, spec_path, timestamp, &err);
        }

        let mut warnings = Vec::new();
        if let Err(err) = self.fs.remove_dir_all(spec_path) {
            Self::emit_warning(
                "ORIGINAL_NOT_REMOVED",
                "remove-original",
                &spec_name,
                spec_path,
                "remove-failed-after-verified-copy",
                &err.to_string(),
            );
            warnings.push(format!(
                "archived copy is complete but the original at {} could not be removed: {err}",
                spec_path.display()
            ));
        }

        let index_updated = match self.index.add_archive_entry(&metadata) {
            Ok(()) => true,
            Err(err) => {
                Self::emit_warning(
                    "INDEX_UPDATE_FAILED",
                    "index-add",
                    &spec_name,
                    &destination,
                    "run-index-repair",
                    &err.to_string(),
                );
                warnings.push(format!(
                    "archive index not updated ({err}); run `spec-archive index repair`"
                ));
                false
            }
        };

        ArchivalResult {
            success: true,
            spec_name,
            original_path: spec_path.to_path_buf(),
            archive_path: Some(destination),
            timestamp,
            error: None,
            error_code: None,
            warnings,
            index_updated,
            metadata: Some(metadata),
        }
    }
}
