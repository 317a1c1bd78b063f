use crate::archival::fsops::atomic_write;
use crate::archival::paths::DEFAULT_ARCHIVE_DIR;
use crate::archival::warn::{self, WarnEvent};
use crate::error::{ArchivalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DELAY_MINUTES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Silent,
    Minimal,
    Verbose,
}

impl NotificationLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "silent" | "none" | "off" => Some(Self::Silent),
            "minimal" | "normal" => Some(Self::Minimal),
            "verbose" | "detailed" | "all" => Some(Self::Verbose),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Silent => "silent",
            Self::Minimal => "minimal",
            Self::Verbose => "verbose",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalConfig {
    pub enabled: bool,
    pub delay_minutes: u64,
    pub archive_location: String,
    pub notification_level: NotificationLevel,
    pub backup_enabled: bool,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_minutes: DEFAULT_DELAY_MINUTES,
            archive_location: DEFAULT_ARCHIVE_DIR.to_string(),
            notification_level: NotificationLevel::Minimal,
            backup_enabled: false,
        }
    }
}

/// Map an untyped JSON document onto [`ArchivalConfig`], replacing every
/// missing or invalid field with its default. Returns the notes describing
/// each replacement of a present-but-invalid field.
pub fn coerce(value: &Value) -> (ArchivalConfig, Vec<String>) {
    let mut cfg = ArchivalConfig::default();
    let mut notes = Vec::new();
    let Some(obj) = value.as_object() else {
        notes.push("config root is not an object; using defaults".to_string());
        return (cfg, notes);
    };

    if let Some(v) = obj.get("enabled") {
        match v.as_bool() {
            Some(b) => cfg.enabled = b,
            None => notes.push(format!("enabled={v} is not a boolean; using default")),
        }
    }
    if let Some(v) = obj.get("delayMinutes") {
        let whole = v
            .as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
        match whole {
            Some(n) if n >= 0 => cfg.delay_minutes = n as u64,
            _ => notes.push(format!(
                "delayMinutes={v} must be a non-negative integer; using {DEFAULT_DELAY_MINUTES}"
            )),
        }
    }
    if let Some(v) = obj.get("archiveLocation") {
        match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => cfg.archive_location = s.to_string(),
            _ => notes.push(format!(
                "archiveLocation={v} must be a non-empty path; using {DEFAULT_ARCHIVE_DIR}"
            )),
        }
    }
    if let Some(v) = obj.get("notificationLevel") {
        match v.as_str().and_then(NotificationLevel::parse) {
            Some(level) => cfg.notification_level = level,
            None => notes.push(format!("notificationLevel={v} is unknown; using minimal")),
        }
    }
    if let Some(v) = obj.get("backupEnabled") {
        match v.as_bool() {
            Some(b) => cfg.backup_enabled = b,
            None => notes.push(format!("backupEnabled={v} is not a boolean; using default")),
        }
    }

    (cfg, notes)
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

/// Layer `SPEC_ARCHIVE_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(mut cfg: ArchivalConfig) -> ArchivalConfig {
    cfg.enabled = env_or_bool("SPEC_ARCHIVE_ENABLED", cfg.enabled);
    cfg.delay_minutes = env_or_u64("SPEC_ARCHIVE_DELAY_MINUTES", cfg.delay_minutes);
    cfg.archive_location = env_or_string("SPEC_ARCHIVE_LOCATION", &cfg.archive_location);
    cfg.backup_enabled = env_or_bool("SPEC_ARCHIVE_BACKUP_ENABLED", cfg.backup_enabled);
    if let Ok(raw) = env::var("SPEC_ARCHIVE_NOTIFICATION_LEVEL") {
        if let Some(level) = NotificationLevel::parse(&raw) {
            cfg.notification_level = level;
        }
    }
    cfg
}

#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    path: PathBuf,
}

impl ConfigurationManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_config() -> ArchivalConfig {
        ArchivalConfig::default()
    }

    fn fallback(&self, reason: &str, err: &str) -> ArchivalConfig {
        warn::emit(WarnEvent {
            code: "CONFIG_FALLBACK",
            stage: "config",
            action: "load",
            spec: "",
            path: &self.path.display().to_string(),
            reason,
            err,
        });
        ArchivalConfig::default()
    }

    /// Load the config file. Never fails: a missing file means defaults, and
    /// an unreadable or corrupt one falls back to defaults with a warning.
    pub fn load_config(&self) -> ArchivalConfig {
        if !self.path.exists() {
            return ArchivalConfig::default();
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => return self.fallback("unreadable", &err.to_string()),
        };
        let value: Value = match json5::from_str(&raw) {
            Ok(value) => value,
            Err(err) => return self.fallback("invalid-json", &err.to_string()),
        };

        let (cfg, notes) = coerce(&value);
        for note in notes {
            warn::emit(WarnEvent {
                code: "CONFIG_FIELD_DEFAULTED",
                stage: "config",
                action: "coerce",
                spec: "",
                path: &self.path.display().to_string(),
                reason: "invalid-field",
                err: &note,
            });
        }
        cfg
    }

    pub fn save_config(&self, cfg: &ArchivalConfig) -> Result<()> {
        let mut data = serde_json::to_string_pretty(cfg)
            .map_err(|err| ArchivalError::configuration(&self.path, err))?;
        data.push('\n');
        atomic_write(&self.path, data.as_bytes())
            .map_err(|err| ArchivalError::configuration(&self.path, err))
    }

    /// Unknown keys in the file, reported by `config show`.
    pub fn unknown_keys(&self) -> Vec<String> {
        const KNOWN: [&str; 5] = [
            "enabled",
            "delayMinutes",
            "archiveLocation",
            "notificationLevel",
            "backupEnabled",
        ];
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let Ok(Value::Object(obj)) = json5::from_str::<Value>(&raw) else {
            return Vec::new();
        };
        obj.keys()
            .filter(|k| !KNOWN.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempdir().expect("tempdir");
        let mgr = ConfigurationManager::new(tmp.path().join("nope.json"));
        assert_eq!(mgr.load_config(), ArchivalConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempdir().expect("tempdir");
        let mgr = ConfigurationManager::new(tmp.path().join("cfg/archive.json"));
        let cfg = ArchivalConfig {
            enabled: false,
            delay_minutes: 0,
            archive_location: "/srv/spec-archive".to_string(),
            notification_level: NotificationLevel::Verbose,
            backup_enabled: true,
        };
        mgr.save_config(&cfg).expect("save");
        assert_eq!(mgr.load_config(), cfg);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("archive.json");
        fs::write(&path, "{ not json at all").expect("write");
        let mgr = ConfigurationManager::new(&path);
        assert_eq!(mgr.load_config(), ArchivalConfig::default());
    }

    #[test]
    fn partial_file_keeps_valid_fields() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("archive.json");
        // json5 tolerates comments and trailing commas.
        fs::write(&path, "{\n  // keep it quiet\n  \"notificationLevel\": \"silent\",\n}\n")
            .expect("write");
        let cfg = ConfigurationManager::new(&path).load_config();
        assert_eq!(cfg.notification_level, NotificationLevel::Silent);
        assert_eq!(cfg.delay_minutes, DEFAULT_DELAY_MINUTES);
        assert!(cfg.enabled);
    }

    #[test]
    fn invalid_values_are_replaced_and_noted() {
        let (cfg, notes) = coerce(&json!({
            "enabled": "yes",
            "delayMinutes": -3,
            "archiveLocation": "  ",
            "notificationLevel": "loud",
            "backupEnabled": true
        }));
        assert!(cfg.enabled);
        assert_eq!(cfg.delay_minutes, DEFAULT_DELAY_MINUTES);
        assert_eq!(cfg.archive_location, DEFAULT_ARCHIVE_DIR);
        assert_eq!(cfg.notification_level, NotificationLevel::Minimal);
        assert!(cfg.backup_enabled);
        assert_eq!(notes.len(), 4);
    }

    #[test]
    fn save_into_unwritable_location_is_a_configuration_error() {
        let tmp = tempdir().expect("tempdir");
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").expect("write");
        let mgr = ConfigurationManager::new(blocker.join("archive.json"));
        let err = mgr
            .save_config(&ArchivalConfig::default())
            .expect_err("parent is a file");
        assert_eq!(err.code().as_str(), "E007_CONFIGURATION");
    }

    #[test]
    fn unknown_keys_are_listed() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("archive.json");
        fs::write(&path, r#"{"enabled": true, "delay": 3}"#).expect("write");
        assert_eq!(ConfigurationManager::new(&path).unknown_keys(), vec!["delay"]);
    }
}
