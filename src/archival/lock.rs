use crate::archival::paths::LOCK_FILE;
use crate::error::{ArchivalError, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Exclusive advisory lock over one archive root. Released on drop.
#[derive(Debug)]
pub struct ArchiveLock {
    file: File,
}

impl ArchiveLock {
    pub fn acquire(archive_root: &Path) -> Result<Self> {
        fs::create_dir_all(archive_root)?;
        let path = archive_root.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(ArchivalError::Locked(path));
        }

        let holder = LockHolder {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let body = serde_json::to_string(&holder).unwrap_or_default();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{body}")?;
        file.flush()?;

        Ok(Self { file })
    }

    /// Who holds the lock at `archive_root`, if the lock file names anyone.
    pub fn holder(archive_root: &Path) -> Option<LockHolder> {
        let raw = fs::read_to_string(archive_root.join(LOCK_FILE)).ok()?;
        serde_json::from_str(raw.trim()).ok()
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
