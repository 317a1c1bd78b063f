use anyhow::Result;

use crate::archival::config::{ArchivalConfig, ConfigurationManager};
use crate::commands::{CommandReport, Workspace};

#[derive(Debug, Clone)]
pub enum ConfigAction {
    Show,
    Init { force: bool },
}

pub fn run(ws: &Workspace, action: &ConfigAction) -> Result<CommandReport> {
    match action {
        ConfigAction::Show => Ok(show(ws)),
        ConfigAction::Init { force } => Ok(init(&ws.config_manager, *force)),
    }
}

fn show(ws: &Workspace) -> CommandReport {
    let mut report = CommandReport::new("config show");
    let path = ws.config_manager.path();
    report.detail(format!("config_file={}", path.display()));
    report.detail(format!("config_file.exists={}", path.exists()));

    let cfg = &ws.config;
    report.detail(format!("enabled={}", cfg.enabled));
    report.detail(format!("delayMinutes={}", cfg.delay_minutes));
    report.detail(format!("archiveLocation={}", cfg.archive_location));
    report.detail(format!("archiveRoot={}", ws.archive_root().display()));
    report.detail(format!("notificationLevel={}", cfg.notification_level.as_str()));
    report.detail(format!("backupEnabled={}", cfg.backup_enabled));

    for key in ws.config_manager.unknown_keys() {
        report.detail(format!("warning: unknown config key {key}"));
    }
    report
}

fn init(manager: &ConfigurationManager, force: bool) -> CommandReport {
    let mut report = CommandReport::new("config init");
    let path = manager.path();
    if path.exists() && !force {
        report.issue(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        ));
        return report;
    }
    match manager.save_config(&ArchivalConfig::default()) {
        Ok(()) => report.detail(format!("wrote default config to {}", path.display())),
        Err(err) => report.archival_issue(&err),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_refuses_to_clobber_without_force() {
        let tmp = tempdir().expect("tempdir");
        let manager = ConfigurationManager::new(tmp.path().join(".archive-config.json"));
        assert!(init(&manager, false).ok);
        assert!(!init(&manager, false).ok);
        assert!(init(&manager, true).ok);
        assert_eq!(manager.load_config(), ArchivalConfig::default());
    }
}
