use crate::archival::fsops::atomic_write;
use crate::archival::paths::{self, INDEX_BACKUP_FILE, METADATA_FILE};
use crate::error::{ArchivalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_VERSION: &str = "1.0";
pub const STAGING_PREFIX: &str = ".staging-";

/// Written once per archived spec, next to the archived documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub spec_name: String,
    pub original_path: String,
    pub archive_path: String,
    pub completion_date: DateTime<Utc>,
    pub archival_date: DateTime<Utc>,
    pub total_tasks: usize,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveIndexEntry {
    pub spec_name: String,
    pub original_path: String,
    pub archive_path: String,
    pub completion_date: DateTime<Utc>,
    pub archival_date: DateTime<Utc>,
    pub total_tasks: usize,
}

impl From<&ArchiveMetadata> for ArchiveIndexEntry {
    fn from(meta: &ArchiveMetadata) -> Self {
        Self {
            spec_name: meta.spec_name.clone(),
            original_path: meta.original_path.clone(),
            archive_path: meta.archive_path.clone(),
            completion_date: meta.completion_date,
            archival_date: meta.archival_date,
            total_tasks: meta.total_tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveIndex {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub archives: Vec<ArchiveIndexEntry>,
}

impl ArchiveIndex {
    pub fn empty() -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            last_updated: Utc::now(),
            archives: Vec::new(),
        }
    }

    fn sort(&mut self) {
        self.archives
            .sort_by(|a, b| b.archival_date.cmp(&a.archival_date));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub total_archives: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_archive: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_archive: Option<DateTime<Utc>>,
    pub total_tasks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub is_valid: bool,
    pub repaired: bool,
    pub issues: Vec<String>,
}

fn coerce_date(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn coerce_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn coerce_entry(value: &Value) -> Option<ArchiveIndexEntry> {
    let obj = value.as_object()?;
    let archive_path = coerce_string(obj.get("archivePath"));
    let spec_name = match obj.get("specName").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => Path::new(&archive_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string(),
    };
    Some(ArchiveIndexEntry {
        spec_name,
        original_path: coerce_string(obj.get("originalPath")),
        archive_path,
        completion_date: coerce_date(obj.get("completionDate")),
        archival_date: coerce_date(obj.get("archivalDate")),
        total_tasks: obj
            .get("totalTasks")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize,
    })
}

/// Best-effort typed view of an index document; bad fields become defaults
/// and entries that are not objects are dropped.
pub fn coerce_index(value: &Value) -> ArchiveIndex {
    let version = value
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(INDEX_VERSION)
        .to_string();
    let archives = value
        .get("archives")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(coerce_entry).collect())
        .unwrap_or_default();
    let mut index = ArchiveIndex {
        version,
        last_updated: coerce_date(value.get("lastUpdated")),
        archives,
    };
    index.sort();
    index
}

/// Owns the archive index file. The parsed index is cached for the life of
/// the manager; a new manager always reloads from disk.
#[derive(Debug)]
pub struct ArchiveIndexManager {
    archive_root: PathBuf,
    index_path: PathBuf,
    backup_enabled: bool,
    cache: Option<ArchiveIndex>,
}

impl ArchiveIndexManager {
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        let archive_root = archive_root.into();
        let archive_root = std::path::absolute(&archive_root).unwrap_or(archive_root);
        let index_path = paths::index_path(&archive_root);
        Self {
            archive_root,
            index_path,
            backup_enabled: false,
            cache: None,
        }
    }

    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    fn load_from_disk(&self) -> Result<ArchiveIndex> {
        if !self.index_path.exists() {
            fs::create_dir_all(&self.archive_root)
                .map_err(|err| ArchivalError::configuration(&self.archive_root, err))?;
            let index = ArchiveIndex::empty();
            self.write(&index)?;
            return Ok(index);
        }

        let raw = fs::read_to_string(&self.index_path)
            .map_err(|err| ArchivalError::configuration(&self.index_path, err))?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|source| ArchivalError::IndexCorrupt {
                path: self.index_path.clone(),
                source,
            })?;
        Ok(coerce_index(&value))
    }

    fn write(&self, index: &ArchiveIndex) -> Result<()> {
        if self.backup_enabled && self.index_path.exists() {
            let backup = self.archive_root.join(INDEX_BACKUP_FILE);
            fs::copy(&self.index_path, &backup)
                .map_err(|err| ArchivalError::configuration(&backup, err))?;
        }
        let mut data = serde_json::to_string_pretty(index)
            .map_err(|err| ArchivalError::configuration(&self.index_path, err))?;
        data.push('\n');
        atomic_write(&self.index_path, data.as_bytes())
            .map_err(|err| ArchivalError::configuration(&self.index_path, err))
    }

    fn index_mut(&mut self) -> Result<&mut ArchiveIndex> {
        if self.cache.is_none() {
            self.cache = Some(self.load_from_disk()?);
        }
        Ok(self.cache.get_or_insert_with(ArchiveIndex::empty))
    }

    pub fn get_index(&mut self) -> Result<&ArchiveIndex> {
        Ok(&*self.index_mut()?)
    }

    fn persist(&mut self) -> Result<()> {
        let index = self.index_mut()?;
        index.sort();
        index.last_updated = Utc::now();
        let snapshot = index.clone();
        self.write(&snapshot)
    }

    pub fn add_archive_entry(&mut self, metadata: &ArchiveMetadata) -> Result<()> {
        let entry = ArchiveIndexEntry::from(metadata);
        let index = self.index_mut()?;
        match index
            .archives
            .iter_mut()
            .find(|e| e.archive_path == entry.archive_path)
        {
            Some(existing) => *existing = entry,
            None => index.archives.push(entry),
        }
        self.persist()
    }

    pub fn remove_archive_entry(&mut self, archive_path: &str) -> Result<bool> {
        let index = self.index_mut()?;
        let before = index.archives.len();
        index.archives.retain(|e| e.archive_path != archive_path);
        if index.archives.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn search_archives(&mut self, term: &str) -> Result<Vec<ArchiveIndexEntry>> {
        let needle = term.to_lowercase();
        Ok(self
            .get_index()?
            .archives
            .iter()
            .filter(|e| e.spec_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    /// Most recent archive of `spec_name`.
    pub fn get_archive_by_spec_name(&mut self, spec_name: &str) -> Result<Option<ArchiveIndexEntry>> {
        Ok(self
            .get_index()?
            .archives
            .iter()
            .find(|e| e.spec_name == spec_name)
            .cloned())
    }

    pub fn get_archive_by_path(&mut self, archive_path: &str) -> Result<Option<ArchiveIndexEntry>> {
        Ok(self
            .get_index()?
            .archives
            .iter()
            .find(|e| e.archive_path == archive_path)
            .cloned())
    }

    pub fn get_archive_stats(&mut self) -> Result<ArchiveStats> {
        let index = self.get_index()?;
        Ok(ArchiveStats {
            total_archives: index.archives.len(),
            oldest_archive: index.archives.iter().map(|e| e.archival_date).min(),
            newest_archive: index.archives.iter().map(|e| e.archival_date).max(),
            total_tasks: index.archives.iter().map(|e| e.total_tasks).sum(),
        })
    }

    fn resolve(&self, archive_path: &str) -> PathBuf {
        let path = Path::new(archive_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.archive_root.join(path)
        }
    }

    // Same directory, however the path to it was spelled.
    fn dir_key(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn read_metadata(dir: &Path) -> Option<ArchiveMetadata> {
        let raw = fs::read_to_string(dir.join(METADATA_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Archive directories and leftover staging directories under the root.
    fn scan_archive_root(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut archives = Vec::new();
        let mut staging = Vec::new();
        let Ok(read_dir) = fs::read_dir(&self.archive_root) else {
            return (archives, staging);
        };
        for entry in read_dir.flatten() {
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) {
                staging.push(entry.path());
            } else if !name.starts_with('.') {
                archives.push(entry.path());
            }
        }
        archives.sort();
        staging.sort();
        (archives, staging)
    }

    /// Reconcile the index with the archive tree: drop duplicate and dangling
    /// entries, register archives that have metadata but no entry, and clear
    /// staging directories left by interrupted runs.
    pub fn validate_and_repair_index(&mut self) -> RepairReport {
        let mut issues = Vec::new();
        let entries = match self.get_index() {
            Ok(index) => index.archives.clone(),
            Err(err) => {
                return RepairReport {
                    is_valid: false,
                    repaired: false,
                    issues: vec![format!("index could not be loaded: {err}")],
                };
            }
        };

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let dir = self.resolve(&entry.archive_path);
            if !dir.is_dir() {
                issues.push(format!(
                    "entry for missing archive removed: {}",
                    entry.archive_path
                ));
                continue;
            }
            if !seen.insert(Self::dir_key(&dir)) {
                issues.push(format!("duplicate entry removed: {}", entry.archive_path));
                continue;
            }
            kept.push(entry);
        }

        let (archive_dirs, staging_dirs) = self.scan_archive_root();
        for dir in archive_dirs {
            if seen.contains(&Self::dir_key(&dir)) {
                continue;
            }
            let Some(mut meta) = Self::read_metadata(&dir) else {
                continue;
            };
            meta.archive_path = dir.display().to_string();
            issues.push(format!("unindexed archive registered: {}", meta.archive_path));
            seen.insert(Self::dir_key(&dir));
            kept.push(ArchiveIndexEntry::from(&meta));
        }

        for dir in staging_dirs {
            match fs::remove_dir_all(&dir) {
                Ok(()) => issues.push(format!("stale staging dir removed: {}", dir.display())),
                Err(err) => issues.push(format!(
                    "stale staging dir could not be removed: {} ({err})",
                    dir.display()
                )),
            }
        }

        if issues.is_empty() {
            return RepairReport {
                is_valid: true,
                repaired: false,
                issues,
            };
        }

        let changed = match self.index_mut() {
            Ok(index) if index.archives != kept => {
                index.archives = kept;
                true
            }
            _ => false,
        };
        let mut repaired = changed;
        if changed {
            if let Err(err) = self.persist() {
                issues.push(format!("repaired index could not be written: {err}"));
                repaired = false;
            }
        }

        RepairReport {
            is_valid: false,
            repaired,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::tempdir;

    fn metadata(root: &Path, name: &str, offset_mins: i64) -> ArchiveMetadata {
        let archival_date = Utc::now() + TimeDelta::minutes(offset_mins);
        let dir = root.join(format!("{}_{name}", archival_date.format("%Y%m%dT%H%M%SZ")));
        fs::create_dir_all(&dir).expect("mkdir archive");
        ArchiveMetadata {
            spec_name: name.to_string(),
            original_path: format!("/specs/{name}"),
            archive_path: dir.display().to_string(),
            completion_date: archival_date - TimeDelta::minutes(30),
            archival_date,
            total_tasks: 3,
            version: INDEX_VERSION.to_string(),
        }
    }

    #[test]
    fn first_access_creates_empty_index() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("archive");
        let mut mgr = ArchiveIndexManager::new(&root);
        assert!(mgr.get_index().expect("index").archives.is_empty());
        assert!(root.join(paths::INDEX_FILE).is_file());
    }

    #[test]
    fn add_then_lookup_by_path_round_trips() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let meta = metadata(tmp.path(), "foo", 0);
        mgr.add_archive_entry(&meta).expect("add");

        let mut fresh = ArchiveIndexManager::new(tmp.path());
        let found = fresh
            .get_archive_by_path(&meta.archive_path)
            .expect("lookup")
            .expect("present");
        assert_eq!(found, ArchiveIndexEntry::from(&meta));
    }

    #[test]
    fn add_upserts_and_sorts_newest_first() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let old = metadata(tmp.path(), "old", -60);
        let new = metadata(tmp.path(), "new", 0);
        mgr.add_archive_entry(&old).expect("add old");
        mgr.add_archive_entry(&new).expect("add new");

        let mut updated = old.clone();
        updated.total_tasks = 9;
        mgr.add_archive_entry(&updated).expect("upsert");

        let index = mgr.get_index().expect("index");
        assert_eq!(index.archives.len(), 2);
        assert_eq!(index.archives[0].spec_name, "new");
        assert_eq!(index.archives[1].total_tasks, 9);
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let meta = metadata(tmp.path(), "foo", 0);
        mgr.add_archive_entry(&meta).expect("add");
        assert!(!mgr.remove_archive_entry("/nowhere").expect("noop"));
        assert!(mgr.remove_archive_entry(&meta.archive_path).expect("remove"));
        assert!(mgr.get_index().expect("index").archives.is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        mgr.add_archive_entry(&metadata(tmp.path(), "User-Auth", 0))
            .expect("add");
        mgr.add_archive_entry(&metadata(tmp.path(), "billing", 1))
            .expect("add");
        let hits = mgr.search_archives("auth").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].spec_name, "User-Auth");
        assert!(mgr.get_archive_by_spec_name("billing").expect("get").is_some());
        assert!(mgr.get_archive_by_spec_name("bill").expect("get").is_none());
    }

    #[test]
    fn stats_on_empty_index_have_no_dates() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let stats = mgr.get_archive_stats().expect("stats");
        assert_eq!(stats, ArchiveStats::default());

        mgr.add_archive_entry(&metadata(tmp.path(), "a", -5)).expect("add");
        mgr.add_archive_entry(&metadata(tmp.path(), "b", 0)).expect("add");
        let stats = mgr.get_archive_stats().expect("stats");
        assert_eq!(stats.total_archives, 2);
        assert_eq!(stats.total_tasks, 6);
        assert!(stats.oldest_archive < stats.newest_archive);
    }

    #[test]
    fn cache_lives_per_instance() {
        let tmp = tempdir().expect("tempdir");
        let mut first = ArchiveIndexManager::new(tmp.path());
        first.get_index().expect("load");

        let mut second = ArchiveIndexManager::new(tmp.path());
        second
            .add_archive_entry(&metadata(tmp.path(), "foo", 0))
            .expect("add");

        assert!(first.get_index().expect("cached").archives.is_empty());
        let mut third = ArchiveIndexManager::new(tmp.path());
        assert_eq!(third.get_index().expect("fresh").archives.len(), 1);
    }

    #[test]
    fn corrupt_fields_are_coerced() {
        let tmp = tempdir().expect("tempdir");
        fs::write(
            paths::index_path(tmp.path()),
            r#"{"archives": [{"archivePath": "/x/2024_foo", "totalTasks": "three"}, 42]}"#,
        )
        .expect("write");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let index = mgr.get_index().expect("load");
        assert_eq!(index.version, INDEX_VERSION);
        assert_eq!(index.archives.len(), 1);
        assert_eq!(index.archives[0].spec_name, "2024_foo");
        assert_eq!(index.archives[0].total_tasks, 0);
        assert_eq!(index.archives[0].archival_date, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn unparseable_index_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        fs::write(paths::index_path(tmp.path()), "{{{").expect("write");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let err = mgr.get_index().expect_err("corrupt");
        assert_eq!(err.code().as_str(), "E008_INDEX_CORRUPT");

        let report = mgr.validate_and_repair_index();
        assert!(!report.is_valid);
        assert!(!report.repaired);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn repair_drops_dangling_entry() {
        let tmp = tempdir().expect("tempdir");
        fs::write(
            paths::index_path(tmp.path()),
            r#"{
  "version": "1.0",
  "lastUpdated": "2024-05-01T10:00:00Z",
  "archives": [{
    "specName": "ghost",
    "originalPath": "/specs/ghost",
    "archivePath": "/definitely/not/here/20240501T100000Z_ghost",
    "completionDate": "2024-05-01T09:00:00Z",
    "archivalDate": "2024-05-01T10:00:00Z",
    "totalTasks": 2
  }]
}"#,
        )
        .expect("write");

        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let report = mgr.validate_and_repair_index();
        assert!(!report.is_valid);
        assert!(report.repaired);
        assert_eq!(report.issues.len(), 1);
        assert!(ArchiveIndexManager::new(tmp.path())
            .get_index()
            .expect("reload")
            .archives
            .is_empty());
    }

    #[test]
    fn repair_reaches_fixed_point() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let meta = metadata(tmp.path(), "foo", 0);
        mgr.add_archive_entry(&meta).expect("add");
        mgr.add_archive_entry(&metadata(tmp.path(), "bar", 1)).expect("add");
        fs::remove_dir_all(&meta.archive_path).expect("rm");

        // An archive on disk with metadata but no index entry.
        let orphan = metadata(tmp.path(), "orphan", 2);
        fs::write(
            Path::new(&orphan.archive_path).join(METADATA_FILE),
            serde_json::to_string(&orphan).expect("json"),
        )
        .expect("write metadata");
        fs::create_dir_all(tmp.path().join(format!("{STAGING_PREFIX}x"))).expect("staging");

        let first = mgr.validate_and_repair_index();
        assert!(first.repaired);
        assert_eq!(first.issues.len(), 3);

        let second = mgr.validate_and_repair_index();
        assert!(second.is_valid);
        assert!(!second.repaired);
        assert!(second.issues.is_empty());
        assert!(mgr.get_archive_by_spec_name("orphan").expect("get").is_some());
    }

    #[test]
    fn repair_keeps_entries_spelled_relative_to_the_root() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path());
        let mut meta = metadata(tmp.path(), "foo", 0);
        let dir = PathBuf::from(&meta.archive_path);
        meta.archive_path = dir
            .file_name()
            .expect("dir name")
            .to_string_lossy()
            .to_string();
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string(&meta).expect("json"),
        )
        .expect("write metadata");
        mgr.add_archive_entry(&meta).expect("add");

        for _ in 0..2 {
            let report = mgr.validate_and_repair_index();
            assert!(report.is_valid, "{:?}", report.issues);
            assert!(!report.repaired);
        }
        assert_eq!(mgr.get_index().expect("index").archives.len(), 1);
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let mgr = ArchiveIndexManager::new("some/archive");
        assert!(mgr.archive_root().is_absolute());
        assert!(mgr.index_path().is_absolute());
    }

    #[test]
    fn backups_keep_previous_index() {
        let tmp = tempdir().expect("tempdir");
        let mut mgr = ArchiveIndexManager::new(tmp.path()).with_backups(true);
        mgr.add_archive_entry(&metadata(tmp.path(), "foo", 0)).expect("add");
        let backup = tmp.path().join(INDEX_BACKUP_FILE);
        assert!(backup.is_file());
        let raw = fs::read_to_string(backup).expect("read backup");
        assert!(!raw.contains("\"foo\""));
    }
}
