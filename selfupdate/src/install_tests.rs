//! Tests for staging, swapping, committing, and recovery.

use super::*;
use rstest::{fixture, rstest};

const OLD: &[u8] = b"old executable";
const NEW: &[u8] = b"new executable";

struct Site {
    _temp: tempfile::TempDir,
    target: Utf8PathBuf,
    payload: Utf8PathBuf,
}

impl Site {
    fn paths(&self) -> InstallPaths {
        InstallPaths::for_target(&self.target).expect("valid target")
    }

    fn target_contents(&self) -> Vec<u8> {
        fs::read(&self.target).expect("target exists")
    }
}

#[fixture]
fn site() -> Site {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    let target = root.join("app");
    let payload = root.join("payload");
    fs::write(&target, OLD).expect("write target");
    fs::write(&payload, NEW).expect("write payload");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o750)).expect("chmod");
    }
    Site {
        _temp: temp,
        target,
        payload,
    }
}

#[test]
fn side_paths_sit_beside_the_target() {
    let paths = InstallPaths::for_target(Utf8Path::new("/opt/app/bin/app")).expect("valid");
    assert_eq!(paths.staged(), "/opt/app/bin/.app.selfupdate-staged");
    assert_eq!(paths.backup(), "/opt/app/bin/.app.selfupdate-backup");
    assert_eq!(paths.retired(), "/opt/app/bin/.app.selfupdate-retired");
    assert_eq!(paths.lock(), "/opt/app/bin/.app.selfupdate-lock");
}

#[test]
fn bare_file_name_uses_current_directory() {
    let paths = InstallPaths::for_target(Utf8Path::new("app")).expect("valid");
    assert_eq!(paths.staged(), "./.app.selfupdate-staged");
}

#[test]
fn target_without_file_name_is_rejected() {
    let result = InstallPaths::for_target(Utf8Path::new("/"));
    assert!(matches!(result, Err(InstallError::InvalidTarget { .. })));
}

#[rstest]
fn install_commits_and_cleans_up(site: Site) {
    let outcome = install(&site.payload, &site.target, &AcceptAll).expect("install");
    assert!(outcome.replaced_previous);
    assert_eq!(site.target_contents(), NEW);
    assert!(!site.paths().staged().exists());
    assert!(!site.paths().backup().exists());
    assert!(!site.paths().retired().exists());
}

#[rstest]
fn commit_replaces_a_stale_retired_file(site: Site) {
    fs::write(site.paths().retired(), b"older executable").expect("write retired");
    install(&site.payload, &site.target, &AcceptAll).expect("install");
    assert_eq!(site.target_contents(), NEW);
    assert!(!site.paths().retired().exists());
}

#[cfg(unix)]
#[rstest]
fn backup_that_cannot_be_retired_rolls_back(site: Site) {
    // A non-empty directory can neither be unlinked nor renamed over.
    let blocker = site.paths().retired().join("in-use");
    fs::create_dir_all(&blocker).expect("create blocker");

    let result = install(&site.payload, &site.target, &AcceptAll);
    assert!(
        matches!(&result, Err(InstallError::RolledBack { reason }) if reason.contains("retire")),
        "got {result:?}"
    );
    assert_eq!(site.target_contents(), OLD);
    assert!(!site.paths().backup().exists());
}

#[rstest]
fn retired_file_left_by_a_commit_is_not_restored(site: Site) {
    install(&site.payload, &site.target, &AcceptAll).expect("install");
    // The commit could not delete the previous image, which stays parked.
    fs::write(site.paths().retired(), OLD).expect("write retired");

    let action = recover(&site.target).expect("recover");
    assert!(action.removed_retired);
    assert!(action.is_clean());
    assert_eq!(action.to_string(), "removed retired previous version");
    assert_eq!(site.target_contents(), NEW);
    assert!(!site.paths().retired().exists());
}

#[cfg(unix)]
#[rstest]
fn staged_file_takes_target_permissions(site: Site) {
    use std::os::unix::fs::PermissionsExt;
    install(&site.payload, &site.target, &AcceptAll).expect("install");
    let mode = fs::metadata(&site.target).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[cfg(unix)]
#[rstest]
fn fresh_install_is_executable(site: Site) {
    use std::os::unix::fs::PermissionsExt;
    fs::remove_file(&site.target).expect("remove target");
    let outcome = install(&site.payload, &site.target, &ExecutableCheck).expect("install");
    assert!(!outcome.replaced_previous);
    let mode = fs::metadata(&site.target).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[rstest]
fn rejected_commit_restores_previous_file(site: Site) {
    let mut check = MockCommitCheck::new();
    check
        .expect_confirm()
        .times(1)
        .returning(|_| Err("smoke test failed".to_owned()));

    let result = install(&site.payload, &site.target, &check);
    assert!(
        matches!(&result, Err(InstallError::RolledBack { reason }) if reason == "smoke test failed"),
        "got {result:?}"
    );
    assert_eq!(site.target_contents(), OLD);
    assert!(!site.paths().backup().exists());
}

#[rstest]
fn rejected_fresh_install_leaves_no_target(site: Site) {
    fs::remove_file(&site.target).expect("remove target");
    let mut check = MockCommitCheck::new();
    check.expect_confirm().returning(|_| Err("bad".to_owned()));

    let result = install(&site.payload, &site.target, &check);
    assert!(matches!(result, Err(InstallError::RolledBack { .. })));
    assert!(!site.target.exists());
}

#[rstest]
fn dropping_a_swapped_install_rolls_back(site: Site) {
    let swapped = StagedInstall::stage(&site.payload, site.paths())
        .expect("stage")
        .swap()
        .expect("swap");
    assert_eq!(site.target_contents(), NEW);
    drop(swapped);
    assert_eq!(site.target_contents(), OLD);
}

#[rstest]
fn explicit_rollback_restores_previous_file(site: Site) {
    let swapped = StagedInstall::stage(&site.payload, site.paths())
        .expect("stage")
        .swap()
        .expect("swap");
    swapped.rollback().expect("rollback");
    assert_eq!(site.target_contents(), OLD);
}

#[rstest]
fn dropping_a_staged_install_discards_it(site: Site) {
    let staged = StagedInstall::stage(&site.payload, site.paths()).expect("stage");
    assert!(site.paths().staged().exists());
    drop(staged);
    assert!(!site.paths().staged().exists());
    assert_eq!(site.target_contents(), OLD);
}

#[rstest]
fn missing_payload_fails_staging_without_touching_target(site: Site) {
    let missing = site.payload.with_file_name("missing");
    let result = install(&missing, &site.target, &AcceptAll);
    assert!(matches!(result, Err(InstallError::Staging { .. })));
    assert_eq!(site.target_contents(), OLD);
    assert!(!site.paths().staged().exists());
}

#[rstest]
fn crash_after_swap_is_recovered(site: Site) {
    let swapped = StagedInstall::stage(&site.payload, site.paths())
        .expect("stage")
        .swap()
        .expect("swap");
    // Simulate the process dying before commit: no destructor runs.
    std::mem::forget(swapped);
    assert!(site.target.exists());
    assert!(site.paths().backup().exists());

    let action = recover(&site.target).expect("recover");
    assert!(action.restored_backup);
    assert_eq!(site.target_contents(), OLD);
    assert!(!site.paths().backup().exists());
}

#[rstest]
fn crash_while_staged_is_recovered(site: Site) {
    let staged = StagedInstall::stage(&site.payload, site.paths()).expect("stage");
    std::mem::forget(staged);

    let action = recover(&site.target).expect("recover");
    assert_eq!(
        action,
        RecoveryAction {
            restored_backup: false,
            discarded_staged: true,
            removed_retired: false,
        }
    );
    assert_eq!(site.target_contents(), OLD);
}

#[rstest]
fn recover_on_clean_target_does_nothing(site: Site) {
    let action = recover(&site.target).expect("recover");
    assert!(action.is_clean());
    assert_eq!(action.to_string(), "nothing to recover");
    assert_eq!(site.target_contents(), OLD);
}

#[rstest]
fn lock_excludes_a_second_holder(site: Site) {
    let held = InstallLock::try_acquire(&site.target).expect("first lock");
    let second = InstallLock::try_acquire(&site.target);
    assert!(matches!(second, Err(InstallError::Locked { .. })));

    drop(held);
    assert!(InstallLock::try_acquire(&site.target).is_ok());
}

#[rstest]
fn executable_check_rejects_empty_file(site: Site) {
    fs::write(&site.target, b"").expect("truncate");
    assert!(ExecutableCheck.confirm(&site.target).is_err());
}

#[cfg(unix)]
#[rstest]
fn executable_check_rejects_non_executable_file(site: Site) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(&site.target, fs::Permissions::from_mode(0o644)).expect("chmod");
    let result = ExecutableCheck.confirm(&site.target);
    assert!(result.is_err_and(|reason| reason.contains("not executable")));
}
