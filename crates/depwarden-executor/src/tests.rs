use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use depwarden_core::UpgradeCandidate;
use depwarden_policy::{DependencyPolicy, PolicyEngine};
use tempfile::TempDir;

use super::*;

const ORIGINAL_LOCK: &str = "[[package]]\nname = \"a\"\nversion = \"1.0\"\n";

#[derive(Debug, Default)]
struct FakePackageManager {
    lockfile: PathBuf,
    installed: RefCell<BTreeMap<String, String>>,
    failing: BTreeSet<String>,
    timing_out: BTreeSet<String>,
    unhealthy: BTreeSet<String>,
    reinstall_fails: bool,
    upgraded: RefCell<Vec<String>>,
    calls: RefCell<Vec<String>>,
}

impl FakePackageManager {
    fn new(layout: &ProjectLayout) -> Self {
        Self {
            lockfile: layout.lockfile_path(),
            ..Self::default()
        }
    }

    fn installed(self, package: &str, version: &str) -> Self {
        self.installed
            .borrow_mut()
            .insert(package.to_string(), version.to_string());
        self
    }

    fn failing(mut self, package: &str) -> Self {
        self.failing.insert(package.to_string());
        self
    }

    fn timing_out(mut self, package: &str) -> Self {
        self.timing_out.insert(package.to_string());
        self
    }

    fn unhealthy(mut self, package: &str) -> Self {
        self.unhealthy.insert(package.to_string());
        self
    }

    fn reinstall_failing(mut self) -> Self {
        self.reinstall_fails = true;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn attempted(&self, package: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call == &format!("upgrade {package}"))
    }
}

impl PackageManager for FakePackageManager {
    fn upgrade(&self, package: &str, target_version: Option<&str>) -> Result<(), CommandFailure> {
        self.calls.borrow_mut().push(format!("upgrade {package}"));
        if self.timing_out.contains(package) {
            return Err(CommandFailure::TimedOut {
                operation: "Upgrade",
                timeout: CommandTimeouts::default().upgrade,
            });
        }
        if self.failing.contains(package) {
            return Err(CommandFailure::Exited {
                command: format!("poetry add {package}"),
                code: 1,
                stderr: format!("Because {package} depends on nothing, version solving failed."),
            });
        }

        let version = target_version.unwrap_or("9.9.9");
        let mut lock = fs::read_to_string(&self.lockfile).unwrap_or_default();
        lock.push_str(&format!("# {package}=={version}\n"));
        fs::write(&self.lockfile, lock).expect("fake must update lockfile");
        self.installed
            .borrow_mut()
            .insert(package.to_string(), version.to_string());
        self.upgraded.borrow_mut().push(package.to_string());
        Ok(())
    }

    fn installed_version(&self, package: &str) -> Option<String> {
        self.installed.borrow().get(package).cloned()
    }

    fn check(&self) -> Result<(), CommandFailure> {
        self.calls.borrow_mut().push("check".to_string());
        let upgraded = self.upgraded.borrow();
        match upgraded.iter().find(|package| self.unhealthy.contains(*package)) {
            Some(package) => Err(CommandFailure::Exited {
                command: "poetry check".to_string(),
                code: 1,
                stderr: format!("poetry.lock is not consistent with {package}"),
            }),
            None => Ok(()),
        }
    }

    fn reinstall(&self) -> Result<(), CommandFailure> {
        self.calls.borrow_mut().push("reinstall".to_string());
        if self.reinstall_fails {
            return Err(CommandFailure::Exited {
                command: "poetry install --sync".to_string(),
                code: 1,
                stderr: "Installing dependencies from lock file failed".to_string(),
            });
        }
        Ok(())
    }
}

fn project() -> (TempDir, ProjectLayout) {
    let dir = TempDir::new().expect("tempdir must be created");
    let layout = ProjectLayout::new(dir.path());
    fs::write(layout.lockfile_path(), ORIGINAL_LOCK).expect("lockfile must be written");
    (dir, layout)
}

fn executor(
    layout: &ProjectLayout,
    package_manager: FakePackageManager,
    max_batch_size: usize,
) -> SafeUpgradeExecutor<FakePackageManager> {
    SafeUpgradeExecutor::new(
        layout.clone(),
        package_manager,
        ExecutorOptions {
            max_batch_size,
            ..ExecutorOptions::default()
        },
    )
}

fn candidates(specs: &[(&str, &str)]) -> Vec<UpgradeCandidate> {
    specs
        .iter()
        .map(|(package, version)| UpgradeCandidate::new(*package, *version))
        .collect()
}

fn read_lock(layout: &ProjectLayout) -> String {
    fs::read_to_string(layout.lockfile_path()).expect("lockfile must be readable")
}

#[test]
fn layout_defaults_to_poetry_lock_and_var_backups() {
    let layout = ProjectLayout::new("/srv/app");
    assert_eq!(layout.lockfile_path(), Path::new("/srv/app/poetry.lock"));
    assert_eq!(layout.backup_dir(), Path::new("/srv/app/var/upgrade-backups"));
    assert_eq!(
        layout.checkpoint_journal_path(),
        Path::new("/srv/app/var/upgrade-backups/checkpoints.jsonl")
    );

    let custom = ProjectLayout::new("/srv/app")
        .with_lockfile_name("uv.lock")
        .with_backup_dir("/var/backups/app");
    assert_eq!(custom.lockfile_path(), Path::new("/srv/app/uv.lock"));
    assert_eq!(custom.backup_dir(), Path::new("/var/backups/app"));
}

#[test]
fn backup_path_appends_suffix_for_collisions() {
    let layout = ProjectLayout::new("/srv/app");
    let taken_at: DateTime<Utc> = "2024-03-01T12:30:45.000123Z"
        .parse()
        .expect("timestamp must parse");

    assert_eq!(
        layout.backup_path(&taken_at, 0),
        Path::new("/srv/app/var/upgrade-backups/poetry.lock.20240301_123045_000123")
    );
    assert_eq!(
        layout.backup_path(&taken_at, 2),
        Path::new("/srv/app/var/upgrade-backups/poetry.lock.20240301_123045_000123-2")
    );
}

#[test]
fn empty_run_succeeds_with_only_the_initial_checkpoint() {
    let (_dir, layout) = project();
    let executor = executor(&layout, FakePackageManager::new(&layout), 5);

    let report = executor.execute_upgrades(&[], true);

    assert_eq!(report.final_status, FinalStatus::Success);
    assert!(!report.rollback_performed);
    assert!(report.upgrades.is_empty());
    assert_eq!(report.checkpoints.len(), 1);

    let initial = &report.checkpoints[0];
    assert!(initial.success);
    assert!(initial.packages_upgraded.is_empty());
    let backup = initial
        .lock_file_backup
        .as_ref()
        .expect("initial checkpoint must back up the lockfile");
    assert_eq!(
        fs::read_to_string(backup).expect("backup must be readable"),
        ORIGINAL_LOCK
    );
    assert_eq!(
        initial.lock_file_sha256.as_deref(),
        Some(lockfile_sha256(ORIGINAL_LOCK.as_bytes()).as_str())
    );
    assert_eq!(report.summary.batches, 0);
    assert_eq!(report.summary.checkpoints, 1);
}

#[test]
fn initial_checkpoint_without_lockfile_is_marked_unsuccessful() {
    let dir = TempDir::new().expect("tempdir must be created");
    let layout = ProjectLayout::new(dir.path());
    let executor = executor(&layout, FakePackageManager::new(&layout), 5);

    let report = executor.execute_upgrades(&[], false);

    assert_eq!(report.checkpoints.len(), 1);
    assert!(!report.checkpoints[0].success);
    assert!(report.checkpoints[0].lock_file_backup.is_none());
    assert_eq!(report.final_status, FinalStatus::Success);
}

#[test]
fn batches_are_chunked_by_max_batch_size() {
    let (_dir, layout) = project();
    let all = candidates(&[
        ("a", "1"),
        ("b", "1"),
        ("c", "1"),
        ("d", "1"),
        ("e", "1"),
        ("f", "1"),
        ("g", "1"),
    ]);

    let executor_of_three = executor(&layout, FakePackageManager::new(&layout), 3);
    let sizes: Vec<usize> = executor_of_three
        .create_batches(&all)
        .iter()
        .map(|batch| batch.len())
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    let executor_of_zero = executor(&layout, FakePackageManager::new(&layout), 0);
    assert_eq!(executor_of_zero.options().max_batch_size, 1);
    assert_eq!(executor_of_zero.create_batches(&all).len(), 7);
}

#[test]
fn successful_run_checkpoints_after_every_batch() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout)
        .installed("a", "1.0")
        .installed("b", "1.5");
    let executor = executor(&layout, package_manager, 2);

    let report = executor.execute_upgrades(
        &candidates(&[("a", "1.1"), ("b", "2.0"), ("c", "3.0")]),
        true,
    );

    assert_eq!(report.final_status, FinalStatus::Success);
    assert_eq!(report.checkpoints.len(), 3);
    assert_eq!(report.checkpoints[1].packages_upgraded, vec!["a", "b"]);
    assert_eq!(report.checkpoints[2].packages_upgraded, vec!["c"]);
    assert!(report.checkpoints.iter().all(|checkpoint| checkpoint.success));
    assert!(report
        .checkpoints
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));

    let a = report.result_for("a").expect("a must be reported");
    assert_eq!(a.previous_version.as_deref(), Some("1.0"));
    assert_eq!(a.new_version.as_deref(), Some("1.1"));
    assert!(a.error_message.is_none());
    let c = report.result_for("c").expect("c must be reported");
    assert_eq!(c.previous_version, None);
    assert_eq!(c.new_version.as_deref(), Some("3.0"));

    let checks = executor
        .package_manager()
        .calls()
        .iter()
        .filter(|call| *call == "check")
        .count();
    assert_eq!(checks, 2);
    assert_eq!(
        report.summary,
        UpgradeSummary {
            requested: 3,
            total: 3,
            successful: 3,
            failed: 0,
            batches: 2,
            checkpoints: 3,
        }
    );
}

#[test]
fn first_failure_with_rollback_stops_processing() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).failing("a");
    let executor = executor(&layout, package_manager, 5);

    let report = executor.execute_upgrades(
        &candidates(&[("a", "1.1"), ("b", "2.0"), ("c", "3.0")]),
        true,
    );

    assert!(report.rollback_performed);
    assert_eq!(report.final_status, FinalStatus::RolledBack);
    assert_eq!(report.upgrades.len(), 1);
    assert!(!report.upgrades[0].success);
    assert_eq!(
        report.upgrades[0].error_message.as_deref(),
        Some("Because a depends on nothing, version solving failed.")
    );
    assert!(report.upgrades[0].new_version.is_none());

    let package_manager = executor.package_manager();
    assert!(!package_manager.attempted("b"));
    assert!(!package_manager.attempted("c"));
    assert!(!package_manager.calls().contains(&"check".to_string()));
    assert!(package_manager.calls().contains(&"reinstall".to_string()));
    assert_eq!(read_lock(&layout), ORIGINAL_LOCK);
}

#[test]
fn failed_resync_still_counts_as_rollback() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout)
        .unhealthy("b")
        .reinstall_failing();
    let executor = executor(&layout, package_manager, 1);

    let report = executor.execute_upgrades(
        &candidates(&[("a", "1.1"), ("b", "2.0"), ("c", "3.0")]),
        true,
    );

    assert!(report.rollback_performed);
    assert_eq!(report.final_status, FinalStatus::RolledBack);
    assert_eq!(report.upgrades.len(), 2);
    assert!(!executor.package_manager().attempted("c"));
    assert!(executor
        .package_manager()
        .calls()
        .contains(&"reinstall".to_string()));
    assert_eq!(read_lock(&layout), ORIGINAL_LOCK);

    let err = executor
        .rollback_to(&report.checkpoints[0])
        .expect_err("resync failure must surface from rollback_to");
    assert!(matches!(err, RollbackError::Reinstall(_)));
}

#[test]
fn failure_mid_batch_checkpoints_only_attempted_packages() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).failing("b");
    let executor = executor(&layout, package_manager, 5);

    let report = executor.execute_upgrades(
        &candidates(&[("a", "1.1"), ("b", "2.0"), ("c", "3.0")]),
        false,
    );

    assert_eq!(report.final_status, FinalStatus::Partial);
    assert_eq!(report.checkpoints.len(), 2);
    assert_eq!(report.checkpoints[1].packages_upgraded, vec!["a", "b"]);
    assert!(!report.checkpoints[1].success);
    assert!(!executor.package_manager().attempted("c"));
    assert_eq!(report.summary.requested, 3);
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.failed, 1);
}

#[test]
fn failed_health_check_without_rollback_is_partial() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).unhealthy("b");
    let executor = executor(&layout, package_manager, 1);

    let report = executor.execute_upgrades(&candidates(&[("a", "1.1"), ("b", "2.0")]), false);

    assert_eq!(report.final_status, FinalStatus::Partial);
    assert!(!report.rollback_performed);
    assert!(report.upgrades[0].success);
    assert!(!report.upgrades[1].success);
    assert!(report.upgrades[1]
        .error_message
        .as_deref()
        .expect("health failure must be explained")
        .contains("Health check failed"));

    assert_eq!(report.checkpoints.len(), 3);
    assert!(report.checkpoints[1].success);
    assert!(!report.checkpoints[2].success);
    assert_eq!(report.checkpoints[2].packages_upgraded, vec!["b"]);
    assert!(read_lock(&layout).contains("# b==2.0"));
}

#[test]
fn failed_health_check_with_rollback_restores_pre_run_lockfile() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).unhealthy("b");
    let executor = executor(&layout, package_manager, 1);

    let report = executor.execute_upgrades(&candidates(&[("a", "1.1"), ("b", "2.0")]), true);

    assert_eq!(report.final_status, FinalStatus::RolledBack);
    assert!(report.rollback_performed);
    assert_eq!(read_lock(&layout), ORIGINAL_LOCK);
    assert!(executor
        .package_manager()
        .calls()
        .contains(&"reinstall".to_string()));
}

#[test]
fn disabled_health_checks_are_skipped() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).unhealthy("b");
    let executor = SafeUpgradeExecutor::new(
        layout.clone(),
        package_manager,
        ExecutorOptions {
            max_batch_size: 1,
            enable_health_checks: false,
        },
    );

    let report = executor.execute_upgrades(&candidates(&[("a", "1.1"), ("b", "2.0")]), true);

    assert_eq!(report.final_status, FinalStatus::Success);
    assert!(!executor
        .package_manager()
        .calls()
        .contains(&"check".to_string()));
}

#[test]
fn timeout_is_reported_with_an_explicit_message() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).timing_out("a");
    let executor = executor(&layout, package_manager, 5);

    let report = executor.execute_upgrades(&[UpgradeCandidate::latest("a")], false);

    assert_eq!(report.final_status, FinalStatus::Failed);
    assert_eq!(
        report.upgrades[0].error_message.as_deref(),
        Some("Upgrade timed out after 5 minutes")
    );
}

#[test]
fn rollback_without_initial_backup_fails_cleanly() {
    let dir = TempDir::new().expect("tempdir must be created");
    let layout = ProjectLayout::new(dir.path());
    let package_manager = FakePackageManager::new(&layout).unhealthy("a");
    let executor = executor(&layout, package_manager, 5);

    let report = executor.execute_upgrades(&candidates(&[("a", "1.1")]), true);

    assert!(report.rollback_performed);
    assert_eq!(report.final_status, FinalStatus::RolledBack);
    assert!(!report.checkpoints[0].success);
    assert!(!executor
        .package_manager()
        .calls()
        .contains(&"reinstall".to_string()));
    assert!(read_lock(&layout).contains("# a==1.1"));

    let err = executor
        .rollback_to(&report.checkpoints[0])
        .expect_err("rollback without backup must fail");
    assert!(matches!(err, RollbackError::NoBackup));
}

#[test]
fn rollback_refuses_tampered_backup() {
    let (_dir, layout) = project();
    let checkpoint = create_checkpoint(&layout, CheckpointKind::Initial, Vec::new());
    let backup = checkpoint
        .lock_file_backup
        .clone()
        .expect("checkpoint must have a backup");
    fs::write(&backup, "tampered").expect("backup must be writable");
    fs::write(layout.lockfile_path(), "changed").expect("lockfile must be writable");

    let err = restore_lockfile(&layout, &checkpoint).expect_err("digest mismatch must fail");

    assert!(matches!(err, RollbackError::DigestMismatch { .. }));
    assert_eq!(read_lock(&layout), "changed");
}

#[test]
fn rollback_reports_missing_backup_file() {
    let (_dir, layout) = project();
    let checkpoint = create_checkpoint(&layout, CheckpointKind::Initial, Vec::new());
    let backup = checkpoint
        .lock_file_backup
        .clone()
        .expect("checkpoint must have a backup");
    fs::remove_file(&backup).expect("backup must be removable");

    let err = restore_lockfile(&layout, &checkpoint).expect_err("missing backup must fail");

    assert!(matches!(err, RollbackError::BackupUnreadable { .. }));
}

#[test]
fn checkpoints_never_overwrite_earlier_backups() {
    let (_dir, layout) = project();
    let first = create_checkpoint(&layout, CheckpointKind::Initial, Vec::new());
    fs::write(layout.lockfile_path(), "second").expect("lockfile must be writable");
    let second = create_checkpoint(
        &layout,
        CheckpointKind::Batch { success: true },
        vec!["a".to_string()],
    );

    let first_backup = first.lock_file_backup.expect("first backup");
    let second_backup = second.lock_file_backup.expect("second backup");
    assert_ne!(first_backup, second_backup);
    assert_eq!(
        fs::read_to_string(first_backup).expect("first backup readable"),
        ORIGINAL_LOCK
    );
    assert_eq!(
        fs::read_to_string(second_backup).expect("second backup readable"),
        "second"
    );
}

#[test]
fn journal_records_every_checkpoint_in_order() {
    let (_dir, layout) = project();
    let executor = executor(&layout, FakePackageManager::new(&layout), 1);

    let report = executor.execute_upgrades(&candidates(&[("a", "1.1"), ("b", "2.0")]), false);
    let journal = read_checkpoint_journal(&layout).expect("journal must be readable");

    assert_eq!(journal, report.checkpoints);
}

#[test]
fn journal_is_empty_before_any_run() {
    let (_dir, layout) = project();
    let journal = read_checkpoint_journal(&layout).expect("missing journal must read as empty");
    assert!(journal.is_empty());
}

#[test]
fn journal_rejects_corrupt_lines() {
    let (_dir, layout) = project();
    layout.ensure_backup_dir().expect("backup dir must be created");
    fs::write(layout.checkpoint_journal_path(), "{not json}\n").expect("journal must be written");

    let err = read_checkpoint_journal(&layout).expect_err("corrupt journal must fail");
    assert!(err.to_string().contains("invalid checkpoint journal entry"));
}

#[test]
fn policy_engine_records_only_upgrades_that_stuck() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).unhealthy("b");
    let executor = executor(&layout, package_manager, 1);
    let mut engine = PolicyEngine::new(DependencyPolicy::default());

    executor.execute_upgrades_with_policy(
        &candidates(&[("a", "1.1"), ("b", "2.0")]),
        false,
        &mut engine,
    );

    assert!(engine.last_upgrade("a").is_some());
    assert!(engine.last_upgrade("b").is_none());
}

#[test]
fn policy_engine_records_nothing_after_rollback() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).unhealthy("b");
    let executor = executor(&layout, package_manager, 1);
    let mut engine = PolicyEngine::new(DependencyPolicy::default());

    let report = executor.execute_upgrades_with_policy(
        &candidates(&[("a", "1.1"), ("b", "2.0")]),
        true,
        &mut engine,
    );

    assert!(report.rollback_performed);
    assert!(engine.last_upgrade("a").is_none());
}

#[test]
fn final_status_follows_success_ratio() {
    assert_eq!(FinalStatus::derive(false, 0, 0), FinalStatus::Success);
    assert_eq!(FinalStatus::derive(false, 3, 3), FinalStatus::Success);
    assert_eq!(FinalStatus::derive(false, 1, 3), FinalStatus::Partial);
    assert_eq!(FinalStatus::derive(false, 0, 2), FinalStatus::Failed);
    assert_eq!(FinalStatus::derive(true, 3, 3), FinalStatus::RolledBack);
    assert_eq!(FinalStatus::RolledBack.to_string(), "rolled_back");
}

#[test]
fn report_serializes_to_flat_json() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout).failing("a");
    let executor = executor(&layout, package_manager, 5);
    let report = executor.execute_upgrades(&candidates(&[("a", "1.1")]), true);

    let json = serde_json::to_value(&report).expect("report must serialize");
    assert_eq!(json["final_status"], "rolled_back");
    assert_eq!(json["rollback_performed"], true);
    assert_eq!(json["upgrades"][0]["package"], "a");
    assert_eq!(json["summary"]["checkpoints"], 2);

    let text = serde_json::to_string(&report).expect("report must serialize");
    let decoded: AutoUpgradeReport = serde_json::from_str(&text).expect("report must deserialize");
    assert_eq!(decoded, report);
}

#[test]
fn measured_durations_survive_json_text() {
    let (_dir, layout) = project();
    let package_manager = FakePackageManager::new(&layout);
    let executor = executor(&layout, package_manager, 5);
    let mut report = executor.execute_upgrades(&candidates(&[("a", "1.1")]), true);

    for duration_s in [9.048899982094081, 0.1 + 0.2, 1.0 / 3.0, 123.456789012345] {
        report.upgrades[0].duration_s = duration_s;
        let text = serde_json::to_string_pretty(&report).expect("report must serialize");
        let decoded: AutoUpgradeReport =
            serde_json::from_str(&text).expect("report must deserialize");
        assert_eq!(decoded.upgrades[0].duration_s.to_bits(), duration_s.to_bits());
        assert_eq!(decoded, report);
    }
}

#[test]
fn timeout_messages_name_the_operation_and_limit() {
    let upgrade = CommandFailure::TimedOut {
        operation: "Upgrade",
        timeout: Duration::from_secs(300),
    };
    let query = CommandFailure::TimedOut {
        operation: "Version query",
        timeout: Duration::from_secs(30),
    };
    let reinstall = CommandFailure::TimedOut {
        operation: "Reinstall",
        timeout: Duration::from_secs(600),
    };

    assert_eq!(upgrade.to_string(), "Upgrade timed out after 5 minutes");
    assert_eq!(query.to_string(), "Version query timed out after 30 seconds");
    assert_eq!(reinstall.to_string(), "Reinstall timed out after 10 minutes");
    assert!(upgrade.is_timeout());
}

#[test]
fn show_output_version_line_is_parsed() {
    let output = "name         : requests\nversion      : 2.31.0\ndescription  : HTTP for Humans.\n";
    assert_eq!(parse_show_version(output).as_deref(), Some("2.31.0"));
    assert_eq!(parse_show_version("name : requests\n"), None);
    assert_eq!(parse_show_version("version :\n"), None);
}

#[cfg(unix)]
mod subprocess {
    use std::time::Instant;

    use super::*;

    const SCRIPT: &str = r#"
case "$1" in
  show) printf 'name         : %s\nversion      : 1.2.3\ndescription  : demo\n' "$2" ;;
  add) echo "could not resolve $2" >&2; exit 3 ;;
  update) echo "$2 updated" >> poetry.lock ;;
  check) grep -q broken poetry.lock && { echo "lock out of date" >&2; exit 1; }; exit 0 ;;
  install) sleep 5 ;;
esac
"#;

    fn scripted(dir: &TempDir) -> CliPackageManager {
        let script = dir.path().join("fake-poetry.sh");
        fs::write(&script, SCRIPT).expect("script must be written");
        CliPackageManager::new("sh", dir.path())
            .with_base_args([script.to_string_lossy().into_owned()])
            .with_timeouts(CommandTimeouts {
                reinstall: Duration::from_millis(200),
                ..CommandTimeouts::default()
            })
    }

    #[test]
    fn show_reports_installed_version() {
        let dir = TempDir::new().expect("tempdir must be created");
        let package_manager = scripted(&dir);

        assert_eq!(
            package_manager.installed_version("requests").as_deref(),
            Some("1.2.3")
        );
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = TempDir::new().expect("tempdir must be created");
        let package_manager = scripted(&dir);

        let err = package_manager
            .upgrade("requests", Some("2.0"))
            .expect_err("add must fail");
        match err {
            CommandFailure::Exited { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "could not resolve requests@2.0");
            }
            other => panic!("unexpected failure: {other}"),
        }
    }

    #[test]
    fn slow_command_is_killed_at_its_timeout() {
        let dir = TempDir::new().expect("tempdir must be created");
        let package_manager = scripted(&dir);

        let started = Instant::now();
        let err = package_manager.reinstall().expect_err("install must time out");

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Reinstall timed out after 200 ms");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let dir = TempDir::new().expect("tempdir must be created");
        let package_manager = CliPackageManager::new("depwarden-no-such-program", dir.path());

        let err = package_manager.check().expect_err("spawn must fail");
        assert!(matches!(err, CommandFailure::Spawn { .. }));
        assert_eq!(package_manager.installed_version("requests"), None);
    }

    #[test]
    fn executor_rolls_back_real_subprocess_changes() {
        let dir = TempDir::new().expect("tempdir must be created");
        let layout = ProjectLayout::new(dir.path());
        fs::write(layout.lockfile_path(), ORIGINAL_LOCK).expect("lockfile must be written");
        let executor = SafeUpgradeExecutor::new(
            layout.clone(),
            scripted(&dir),
            ExecutorOptions::default(),
        );

        let report = executor.execute_upgrades(
            &[UpgradeCandidate::latest("ok"), UpgradeCandidate::latest("broken")],
            true,
        );

        assert_eq!(report.final_status, FinalStatus::RolledBack);
        assert_eq!(report.upgrades.len(), 2);
        assert_eq!(report.upgrades[0].new_version.as_deref(), Some("1.2.3"));
        assert_eq!(read_lock(&layout), ORIGINAL_LOCK);
    }
}
