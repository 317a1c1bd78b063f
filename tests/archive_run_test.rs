use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn specs_dir(root: &Path) -> PathBuf {
    root.join(".claude/specs")
}

fn write_spec(root: &Path, name: &str, tasks: &str) -> PathBuf {
    let dir = specs_dir(root).join(name);
    fs::create_dir_all(&dir).expect("mkdir spec");
    fs::write(dir.join("requirements.md"), "# Requirements\n").expect("write req");
    fs::write(dir.join("design.md"), "# Design\n").expect("write design");
    fs::write(dir.join("tasks.md"), tasks).expect("write tasks");
    dir
}

fn cli(root: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("spec-archive");
    cmd.current_dir(root)
        .env("HOME", root)
        .env("SPEC_ARCHIVE_ROOT", root)
        .env("SPEC_ARCHIVE_DELAY_MINUTES", "0");
    cmd
}

#[test]
fn run_archives_complete_specs_and_leaves_the_rest() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n- [x] b\n- [x] c\n");
    let bar = write_spec(tmp.path(), "bar", "- [x] a\n- [x] b\n- [ ] c\n");

    cli(tmp.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("archived foo -> "))
        .stdout(predicate::str::contains("archived=1"))
        .stdout(predicate::str::contains("incomplete=1"));

    assert!(!foo.exists());
    assert!(bar.join("tasks.md").exists());

    let archive = specs_dir(tmp.path()).join("archive");
    let archived: Vec<_> = fs::read_dir(&archive)
        .expect("archive dir")
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with("_foo"))
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archive.join(".archive-index.json").is_file());
    assert!(archive.join(".archive-audit.jsonl").is_file());
}

#[test]
fn dry_run_reports_without_moving_anything() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");

    cli(tmp.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would-archive foo"));

    assert!(foo.join("tasks.md").exists());
    assert!(!specs_dir(tmp.path()).join("archive").exists());
}

#[test]
fn default_delay_holds_back_freshly_finished_specs() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");

    cli(tmp.path())
        .env_remove("SPEC_ARCHIVE_DELAY_MINUTES")
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending_delay=1"));

    assert!(foo.exists());
}

#[test]
fn disabled_via_env_archives_nothing() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");

    cli(tmp.path())
        .env("SPEC_ARCHIVE_ENABLED", "false")
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled=1"));

    assert!(foo.exists());
}

#[test]
fn check_reports_counts_and_blockers() {
    let tmp = tempdir().expect("tempdir");
    write_spec(
        tmp.path(),
        "bar",
        "- [x] 1. a\n- [x] 2. b\n- [ ] 3. c\n  - Depends on: 9\n",
    );

    cli(tmp.path())
        .args(["check", "bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks.total=3"))
        .stdout(predicate::str::contains("tasks.completed=2"))
        .stdout(predicate::str::contains("archivable=false"))
        .stdout(predicate::str::contains("E004_INCOMPLETE"))
        .stdout(predicate::str::contains("warning: task 3 depends on missing task 9"));
}

#[test]
fn check_missing_spec_fails() {
    let tmp = tempdir().expect("tempdir");
    cli(tmp.path())
        .args(["check", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001_SPEC_NOT_FOUND"));
}

#[test]
fn archive_command_rejects_incomplete_spec() {
    let tmp = tempdir().expect("tempdir");
    let bar = write_spec(tmp.path(), "bar", "- [x] a\n- [ ] b\n");

    cli(tmp.path())
        .args(["archive", "bar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E004_INCOMPLETE"));

    assert!(bar.join("tasks.md").exists());
}

#[test]
fn archive_command_ignores_delay_and_reports_json() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n- [x] b\n");

    let output = cli(tmp.path())
        .env_remove("SPEC_ARCHIVE_DELAY_MINUTES")
        .args(["--json", "archive", "foo"])
        .output()
        .expect("run archive");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["command"], "archive");
    assert_eq!(report["ok"], true);
    let details = report["details"].as_array().expect("details");
    assert!(details.iter().any(|d| d == "indexed=true"));
    assert!(details.iter().any(|d| d == "total_tasks=2"));
    assert!(!foo.exists());
}

#[test]
fn check_treats_taskless_spec_as_incomplete() {
    let tmp = tempdir().expect("tempdir");
    write_spec(tmp.path(), "draft", "# Implementation Plan\n\nNothing yet.\n");

    cli(tmp.path())
        .args(["check", "draft"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks.total=0"))
        .stdout(predicate::str::contains("complete=false"))
        .stdout(predicate::str::contains("E004_INCOMPLETE"));
}

#[test]
fn check_warns_about_unknown_dependency_names() {
    let tmp = tempdir().expect("tempdir");
    write_spec(tmp.path(), "bar", "- [x] 1.1 a\n  - Depends on: setup\n");

    cli(tmp.path())
        .args(["check", "bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete=true"))
        .stdout(predicate::str::contains("warning: task 1 depends on unknown task 'setup'"));
}

#[test]
fn archive_succeeds_when_audit_log_is_unwritable() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");
    let archive = specs_dir(tmp.path()).join("archive");
    fs::create_dir_all(archive.join(".archive-audit.jsonl")).expect("block audit log");

    cli(tmp.path())
        .args(["archive", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archived foo -> "))
        .stderr(predicate::str::contains("SPEC_ARCHIVE_WARN code=AUDIT_WRITE_FAILED"));

    assert!(!foo.exists());
}

#[test]
fn run_failures_are_issues_even_when_silent() {
    let tmp = tempdir().expect("tempdir");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");
    fs::remove_file(foo.join("design.md")).expect("rm design");

    cli(tmp.path())
        .env("SPEC_ARCHIVE_NOTIFICATION_LEVEL", "silent")
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed foo").not())
        .stdout(predicate::str::contains("summary").not())
        .stderr(predicate::str::contains("issue: failed foo: E002_MISSING_DOCUMENTS"));

    assert!(foo.join("tasks.md").exists());
}

#[cfg(unix)]
#[test]
fn run_keeps_symlinks_in_the_archive() {
    let tmp = tempdir().expect("tempdir");
    let shared = tmp.path().join("shared");
    fs::create_dir_all(&shared).expect("mkdir shared");
    fs::write(shared.join("notes.md"), "notes").expect("write notes");
    let foo = write_spec(tmp.path(), "foo", "- [x] a\n");
    std::os::unix::fs::symlink("../../../shared/notes.md", foo.join("notes.md"))
        .expect("symlink");

    cli(tmp.path()).arg("run").assert().success();

    let archive = specs_dir(tmp.path()).join("archive");
    let dest = fs::read_dir(&archive)
        .expect("archive dir")
        .flatten()
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("archived dir");
    assert_eq!(
        fs::read_link(dest.join("notes.md")).expect("link kept"),
        PathBuf::from("../../../shared/notes.md")
    );
    assert!(shared.join("notes.md").is_file());
}
