use crate::archival::paths::{INDEX_FILE, TASKS_DOC};
use crate::archival::tasks::{self, TaskDocument};
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionStatus {
    pub is_complete: bool,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    /// Modification time of the tasks document; `None` when it does not exist.
    pub last_modified: Option<DateTime<Utc>>,
}

impl CompletionStatus {
    pub fn absent() -> Self {
        Self {
            is_complete: false,
            total_tasks: 0,
            completed_tasks: 0,
            in_progress_tasks: 0,
            last_modified: None,
        }
    }

    pub fn from_document(doc: &TaskDocument, last_modified: Option<DateTime<Utc>>) -> Self {
        let total_tasks = doc.total();
        let completed_tasks = doc.completed();
        Self {
            is_complete: total_tasks > 0 && completed_tasks == total_tasks,
            total_tasks,
            completed_tasks,
            in_progress_tasks: doc.in_progress(),
            last_modified,
        }
    }

    /// True when the tasks document changed less than `window` before `now`.
    pub fn modified_within(&self, window: TimeDelta, now: DateTime<Utc>) -> bool {
        match self.last_modified {
            Some(modified) => now.signed_duration_since(modified) < window,
            None => false,
        }
    }
}

/// A parsed tasks document together with its on-disk timestamp.
#[derive(Debug, Clone)]
pub struct SpecInspection {
    pub document: TaskDocument,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SpecCompletionDetector {
    excluded: Vec<PathBuf>,
}

impl SpecCompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `dir` when enumerating specs (the archive root usually lives
    /// inside the specs root).
    pub fn excluding(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn tasks_path(spec_path: &Path) -> PathBuf {
        spec_path.join(TASKS_DOC)
    }

    /// Read and parse the tasks document. A missing document is `Ok(None)`.
    pub fn inspect(&self, spec_path: &Path) -> Result<Option<SpecInspection>> {
        let path = Self::tasks_path(spec_path);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let modified = fs::metadata(&path)?.modified()?;
        Ok(Some(SpecInspection {
            document: tasks::parse(&raw),
            last_modified: DateTime::<Utc>::from(modified),
        }))
    }

    pub fn check_spec_completion(&self, spec_path: &Path) -> Result<CompletionStatus> {
        Ok(match self.inspect(spec_path)? {
            Some(found) => CompletionStatus::from_document(&found.document, Some(found.last_modified)),
            None => CompletionStatus::absent(),
        })
    }

    fn is_excluded(&self, dir: &Path) -> bool {
        if self.excluded.iter().any(|ex| ex == dir) {
            return true;
        }
        let hidden = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        hidden || dir.join(INDEX_FILE).exists()
    }

    /// Immediate subdirectories of `specs_root` that carry a tasks document.
    pub fn list_specs(&self, specs_root: &Path) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(specs_root) {
            Ok(rd) => rd,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            if self.is_excluded(&path) || !Self::tasks_path(&path).is_file() {
                continue;
            }
            out.push(path);
        }
        out.sort();
        Ok(out)
    }

    pub fn get_all_completed_specs(&self, specs_root: &Path) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for spec in self.list_specs(specs_root)? {
            if self.check_spec_completion(&spec)?.is_complete {
                out.push(spec);
            }
        }
        Ok(out)
    }
}
