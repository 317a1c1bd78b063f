pub mod archive;
pub mod check;
pub mod config;
pub mod index;
pub mod run;
pub mod status;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::archival::config::{self as archival_config, ArchivalConfig, ConfigurationManager};
use crate::archival::index::ArchiveIndexManager;
use crate::archival::paths::{self, SpecPaths};
use crate::error::ArchivalError;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn archival_issue(&mut self, err: &ArchivalError) {
        self.issue(format!("{}: {err}", err.code().as_str()));
    }
}

/// Resolved paths plus the effective config (file, then env overrides).
#[derive(Debug, Clone)]
pub struct Workspace {
    pub paths: SpecPaths,
    pub config_manager: ConfigurationManager,
    pub config: ArchivalConfig,
}

impl Workspace {
    pub fn load(root: Option<&Path>) -> Result<Self> {
        let paths = paths::resolve_paths(root)?;
        let config_manager = ConfigurationManager::new(&paths.config_file);
        let config = archival_config::apply_env_overrides(config_manager.load_config());
        Ok(Self {
            paths,
            config_manager,
            config,
        })
    }

    pub fn archive_root(&self) -> PathBuf {
        self.paths.archive_root(&self.config.archive_location)
    }

    pub fn index_manager(&self) -> ArchiveIndexManager {
        ArchiveIndexManager::new(self.archive_root()).with_backups(self.config.backup_enabled)
    }

    /// A bare name refers to a directory under the specs dir; anything with a
    /// path separator is taken as given.
    pub fn resolve_spec(&self, spec: &str) -> PathBuf {
        let candidate = Path::new(spec);
        if candidate.is_absolute() || candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            self.paths.specs_dir.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_flips_ok() {
        let mut report = CommandReport::new("check");
        report.detail("fine");
        assert!(report.ok);
        report.archival_issue(&ArchivalError::Locked(PathBuf::from("/a/.archive.lock")));
        assert!(!report.ok);
        assert!(report.issues[0].starts_with("E009_LOCKED: "));
    }

    #[test]
    fn bare_spec_names_resolve_under_specs_dir() {
        let ws = Workspace {
            paths: SpecPaths::for_root(Path::new("/proj")),
            config_manager: ConfigurationManager::new("/proj/.claude/specs/.archive-config.json"),
            config: ArchivalConfig::default(),
        };
        assert_eq!(
            ws.resolve_spec("foo"),
            PathBuf::from("/proj/.claude/specs/foo")
        );
        assert_eq!(ws.resolve_spec("./foo"), PathBuf::from("./foo"));
        assert_eq!(ws.archive_root(), PathBuf::from("/proj/.claude/specs/archive"));
    }
}
