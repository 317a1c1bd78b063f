use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const REQUIREMENTS_DOC: &str = "requirements.md";
pub const DESIGN_DOC: &str = "design.md";
pub const TASKS_DOC: &str = "tasks.md";
pub const REQUIRED_DOCS: [&str; 3] = [REQUIREMENTS_DOC, DESIGN_DOC, TASKS_DOC];

pub const DEFAULT_SPECS_DIR: &str = ".claude/specs";
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
pub const CONFIG_FILE: &str = ".archive-config.json";
pub const INDEX_FILE: &str = ".archive-index.json";
pub const INDEX_BACKUP_FILE: &str = ".archive-index.json.bak";
pub const METADATA_FILE: &str = ".archive-metadata.json";
pub const AUDIT_FILE: &str = ".archive-audit.jsonl";
pub const LOCK_FILE: &str = ".archive.lock";

#[derive(Debug, Clone)]
pub struct SpecPaths {
    pub project_root: PathBuf,
    pub specs_dir: PathBuf,
    pub config_file: PathBuf,
}

impl SpecPaths {
    pub fn for_root(project_root: &Path) -> Self {
        let specs_dir = project_root.join(DEFAULT_SPECS_DIR);
        let config_file = specs_dir.join(CONFIG_FILE);
        Self {
            project_root: project_root.to_path_buf(),
            specs_dir,
            config_file,
        }
    }

    /// Archive root for a configured location; relative locations hang off the specs dir.
    pub fn archive_root(&self, archive_location: &str) -> PathBuf {
        let location = Path::new(archive_location);
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.specs_dir.join(location)
        }
    }
}

pub fn index_path(archive_root: &Path) -> PathBuf {
    archive_root.join(INDEX_FILE)
}

pub fn audit_path(archive_root: &Path) -> PathBuf {
    archive_root.join(AUDIT_FILE)
}

// Relative roots would leak into stored archive paths and break later lookups.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("cannot resolve {}", path.display()))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths(root_override: Option<&Path>) -> Result<SpecPaths> {
    let project_root = match root_override {
        Some(root) => root.to_path_buf(),
        None => {
            let cwd = env::current_dir().context("current directory is not accessible")?;
            env_or_default_path("SPEC_ARCHIVE_ROOT", cwd)
        }
    };

    let mut paths = SpecPaths::for_root(&absolute(&project_root)?);
    paths.specs_dir = absolute(&env_or_default_path(
        "SPEC_ARCHIVE_SPECS_DIR",
        paths.specs_dir,
    ))?;
    paths.config_file = absolute(&env_or_default_path(
        "SPEC_ARCHIVE_CONFIG_PATH",
        paths.specs_dir.join(CONFIG_FILE),
    ))?;
    Ok(paths)
}
