//! Atomic replacement of the installed file.
//!
//! An install moves through explicit states: [`StagedInstall`] (new file
//! written beside the target), [`SwappedInstall`] (new file in place, old
//! file kept as a backup), and finally committed or rolled back. The
//! side files live next to the target under deterministic names so that
//! [`recover`] can finish or undo an install interrupted by a crash:
//!
//! - `.<file>.selfupdate-staged`
//! - `.<file>.selfupdate-backup`
//! - `.<file>.selfupdate-retired`
//! - `.<file>.selfupdate-lock`
//!
//! A backup is only ever restored. Committing renames it to the retired
//! name before deleting it, so a backup that survives a commit (Windows
//! cannot delete a running image) is never mistaken for an unconfirmed
//! install.
//!
//! On Unix the backup is a hard link (or copy) of the target and the staged
//! file is renamed over it, so the target path never disappears. Windows
//! cannot rename over a running executable, so the target is renamed aside
//! first.

use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use std::fmt;
use std::fs::{self, File};
use std::io;

const STAGED_SUFFIX: &str = "selfupdate-staged";
const BACKUP_SUFFIX: &str = "selfupdate-backup";
const RETIRED_SUFFIX: &str = "selfupdate-retired";
const LOCK_SUFFIX: &str = "selfupdate-lock";

/// Errors arising while installing or recovering.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The target path has no file name.
    #[error("invalid install target {path}")]
    InvalidTarget {
        /// The rejected path.
        path: Utf8PathBuf,
    },

    /// Writing the staged file failed; the target is untouched.
    #[error("failed to stage {path}: {source}")]
    Staging {
        /// The staged file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Moving the staged file into place failed; the target is untouched.
    #[error("failed to swap new file into {path}: {source}")]
    Swap {
        /// The target path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The new file was rejected and the previous one restored.
    #[error("new file rejected, previous version restored: {reason}")]
    RolledBack {
        /// Why the commit check failed.
        reason: String,
    },

    /// Restoring the previous file failed.
    #[error("rollback failed, previous version left at {backup}: {source}")]
    RollbackFailed {
        /// Where the previous file remains.
        backup: Utf8PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Cleaning up after an interrupted install failed.
    #[error("recovery failed for {path}: {source}")]
    Recovery {
        /// The side file being recovered.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The install lock could not be opened or taken.
    #[error("could not lock {path}: {source}")]
    Lock {
        /// The lock file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Another process holds the install lock.
    #[error("another update is in progress (lock held at {path})")]
    Locked {
        /// The lock file path.
        path: Utf8PathBuf,
    },
}

/// Deterministic side-file paths for one install target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    target: Utf8PathBuf,
    staged: Utf8PathBuf,
    backup: Utf8PathBuf,
    retired: Utf8PathBuf,
    lock: Utf8PathBuf,
}

impl InstallPaths {
    /// Derive side paths for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::InvalidTarget`] if `target` has no file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use selfupdate::install::InstallPaths;
    ///
    /// let paths = InstallPaths::for_target(Utf8Path::new("/opt/app/bin/app"))
    ///     .expect("valid target");
    /// assert_eq!(paths.backup(), "/opt/app/bin/.app.selfupdate-backup");
    /// ```
    pub fn for_target(target: &Utf8Path) -> Result<Self, InstallError> {
        let file_name = target.file_name().ok_or_else(|| InstallError::InvalidTarget {
            path: target.to_owned(),
        })?;
        let dir = match target.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let side = |suffix: &str| dir.join(format!(".{file_name}.{suffix}"));
        Ok(Self {
            target: target.to_owned(),
            staged: side(STAGED_SUFFIX),
            backup: side(BACKUP_SUFFIX),
            retired: side(RETIRED_SUFFIX),
            lock: side(LOCK_SUFFIX),
        })
    }

    /// Return the installed file path.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    /// Return the staged file path.
    #[must_use]
    pub fn staged(&self) -> &Utf8Path {
        &self.staged
    }

    /// Return the backup file path.
    #[must_use]
    pub fn backup(&self) -> &Utf8Path {
        &self.backup
    }

    /// Return where a committed install parks the previous file until it
    /// can be deleted.
    #[must_use]
    pub fn retired(&self) -> &Utf8Path {
        &self.retired
    }

    /// Return the lock file path.
    #[must_use]
    pub fn lock(&self) -> &Utf8Path {
        &self.lock
    }
}

/// Confirms that a freshly swapped-in file is usable.
///
/// Runs after the swap; a rejection rolls the install back.
#[cfg_attr(test, mockall::automock)]
pub trait CommitCheck {
    /// Inspect `installed` and return a reason if it must not be kept.
    ///
    /// # Errors
    ///
    /// Returns a human-readable rejection reason.
    fn confirm(&self, installed: &Utf8Path) -> Result<(), String>;
}

/// Accepts every installed file.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CommitCheck for AcceptAll {
    fn confirm(&self, _installed: &Utf8Path) -> Result<(), String> {
        Ok(())
    }
}

/// Requires a non-empty file, executable on Unix.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutableCheck;

impl CommitCheck for ExecutableCheck {
    fn confirm(&self, installed: &Utf8Path) -> Result<(), String> {
        let metadata = fs::metadata(installed).map_err(|err| err.to_string())?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(format!("{installed} is empty or not a regular file"));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(format!("{installed} is not executable"));
            }
        }
        Ok(())
    }
}

/// What an install did to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// The installed file.
    pub target: Utf8PathBuf,
    /// Whether a previous file was replaced.
    pub replaced_previous: bool,
}

/// The new file has been written beside the target.
///
/// Dropping a staged install deletes the staged file.
#[derive(Debug)]
pub struct StagedInstall {
    paths: InstallPaths,
    armed: bool,
}

impl StagedInstall {
    /// Copy `payload` to the staged path and give it the target's
    /// permissions (`0o755` on Unix when there is no previous target).
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Staging`]; no staged file is left behind.
    pub fn stage(payload: &Utf8Path, paths: InstallPaths) -> Result<Self, InstallError> {
        let staged = Self { paths, armed: true };
        staged.write_payload(payload).map_err(|source| InstallError::Staging {
            path: staged.paths.staged.clone(),
            source,
        })?;
        log::info!("staged {payload} at {}", staged.paths.staged);
        Ok(staged)
    }

    fn write_payload(&self, payload: &Utf8Path) -> io::Result<()> {
        remove_if_present(&self.paths.staged)?;
        let mut source = File::open(payload)?;
        let mut staged = File::create(&self.paths.staged)?;
        io::copy(&mut source, &mut staged)?;
        staged.sync_all()?;
        drop(staged);

        match fs::metadata(&self.paths.target) {
            Ok(metadata) => fs::set_permissions(&self.paths.staged, metadata.permissions()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => set_default_permissions(&self.paths.staged),
            Err(err) => Err(err),
        }
    }

    /// Return the side paths.
    #[must_use]
    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    /// Preserve the current target as the backup and move the staged file
    /// into place.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Swap`]; the target is left as it was and the
    /// staged file is removed.
    pub fn swap(mut self) -> Result<SwappedInstall, InstallError> {
        let paths = self.paths.clone();
        let swap_error = |source| InstallError::Swap {
            path: paths.target.clone(),
            source,
        };

        let replaced_previous = paths.target.exists();
        if replaced_previous {
            remove_if_present(&paths.backup).map_err(swap_error)?;
            preserve_backup(&paths).map_err(swap_error)?;
        }

        if let Err(source) = fs::rename(&paths.staged, &paths.target) {
            if replaced_previous {
                if let Err(err) = undo_backup(&paths) {
                    log::warn!("could not undo backup {}: {err}", paths.backup);
                }
            }
            return Err(swap_error(source));
        }

        self.armed = false;
        log::info!("swapped new file into {}", paths.target);
        Ok(SwappedInstall {
            paths,
            replaced_previous,
            armed: true,
        })
    }
}

impl Drop for StagedInstall {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = remove_if_present(&self.paths.staged) {
                log::warn!("could not remove staged file {}: {err}", self.paths.staged);
            }
        }
    }
}

/// The new file is in place and the previous one is kept as a backup.
///
/// Dropping a swapped install without committing rolls it back, so an
/// install never ends in this state.
pub struct SwappedInstall {
    paths: InstallPaths,
    replaced_previous: bool,
    armed: bool,
}

impl fmt::Debug for SwappedInstall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwappedInstall")
            .field("target", &self.paths.target)
            .field("replaced_previous", &self.replaced_previous)
            .field("armed", &self.armed)
            .finish()
    }
}

impl SwappedInstall {
    /// Return the side paths.
    #[must_use]
    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    /// Run `check` on the new file and keep it, or roll back.
    ///
    /// The commit is recorded by renaming the backup to the retired path;
    /// deleting the retired file afterwards is best effort and [`recover`]
    /// finishes it later.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::RolledBack`] when the check rejects the file
    /// or the backup cannot be retired and the previous one was restored,
    /// or [`InstallError::RollbackFailed`] when restoring failed too.
    pub fn commit(mut self, check: &dyn CommitCheck) -> Result<InstallOutcome, InstallError> {
        if let Err(reason) = check.confirm(&self.paths.target) {
            log::warn!("commit check rejected {}: {reason}", self.paths.target);
            self.restore()?;
            return Err(InstallError::RolledBack { reason });
        }

        if self.replaced_previous {
            if let Err(err) = retire_backup(&self.paths) {
                log::warn!("could not retire backup {}: {err}", self.paths.backup);
                self.restore()?;
                return Err(InstallError::RolledBack {
                    reason: format!("could not retire backup {}: {err}", self.paths.backup),
                });
            }
            if let Err(err) = remove_if_present(&self.paths.retired) {
                log::warn!("could not remove retired file {}: {err}", self.paths.retired);
            }
        }
        self.armed = false;
        log::info!("committed {}", self.paths.target);
        Ok(InstallOutcome {
            target: self.paths.target.clone(),
            replaced_previous: self.replaced_previous,
        })
    }

    /// Restore the previous file now.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::RollbackFailed`] if the backup could not be
    /// moved back.
    pub fn rollback(mut self) -> Result<(), InstallError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), InstallError> {
        self.armed = false;
        let result = if self.replaced_previous {
            restore_backup(&self.paths)
        } else {
            remove_if_present(&self.paths.target)
        };
        result.map_err(|source| InstallError::RollbackFailed {
            backup: self.paths.backup.clone(),
            source,
        })?;
        log::warn!("rolled back {}", self.paths.target);
        Ok(())
    }
}

impl Drop for SwappedInstall {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.restore() {
                log::warn!("{err}");
            }
        }
    }
}

/// Stage, swap, and commit `payload` over `target`.
///
/// # Errors
///
/// Returns any [`InstallError`] raised along the way. Whatever the failure,
/// `target` holds either the previous file or, on success, the new one.
pub fn install(
    payload: &Utf8Path,
    target: &Utf8Path,
    check: &dyn CommitCheck,
) -> Result<InstallOutcome, InstallError> {
    let paths = InstallPaths::for_target(target)?;
    StagedInstall::stage(payload, paths)?.swap()?.commit(check)
}

/// What [`recover`] found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryAction {
    /// A leftover backup was moved back over the target.
    pub restored_backup: bool,
    /// A leftover staged file was deleted.
    pub discarded_staged: bool,
    /// The previous file parked by a committed install was deleted.
    pub removed_retired: bool,
}

impl RecoveryAction {
    /// Return true when no interrupted install was found.
    ///
    /// Deleting a retired file is housekeeping after a successful commit
    /// and does not count.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.restored_backup && !self.discarded_staged
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps = [
            (self.restored_backup, "restored previous version from backup"),
            (self.discarded_staged, "discarded staged file"),
            (self.removed_retired, "removed retired previous version"),
        ];
        let done: Vec<&str> = steps
            .iter()
            .filter(|(happened, _)| *happened)
            .map(|(_, text)| *text)
            .collect();
        if done.is_empty() {
            return f.write_str("nothing to recover");
        }
        f.write_str(&done.join(" and "))
    }
}

/// Undo an install interrupted before it committed.
///
/// A leftover backup means the new file was never confirmed, so the backup
/// is moved back over the target. A leftover staged file is deleted. A
/// retired file belongs to a committed install and is only deleted; if it
/// is still in use it is left for a later pass.
///
/// # Errors
///
/// Returns [`InstallError::Recovery`] if a backup or staged file cannot be
/// handled.
pub fn recover(target: &Utf8Path) -> Result<RecoveryAction, InstallError> {
    let paths = InstallPaths::for_target(target)?;
    let mut action = RecoveryAction::default();

    if paths.retired.exists() {
        match remove_if_present(&paths.retired) {
            Ok(()) => {
                action.removed_retired = true;
                log::debug!("removed retired file {}", paths.retired);
            }
            Err(err) => log::warn!("retired file {} still in use: {err}", paths.retired),
        }
    }

    if paths.backup.exists() {
        restore_backup(&paths).map_err(|source| InstallError::Recovery {
            path: paths.backup.clone(),
            source,
        })?;
        action.restored_backup = true;
        log::warn!("restored {} from an interrupted update", paths.target);
    }
    if paths.staged.exists() {
        remove_if_present(&paths.staged).map_err(|source| InstallError::Recovery {
            path: paths.staged.clone(),
            source,
        })?;
        action.discarded_staged = true;
        log::info!("discarded leftover staged file {}", paths.staged);
    }
    Ok(action)
}

/// Exclusive advisory lock serializing installs to one target.
///
/// Released when dropped. The lock file itself is left in place.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: Utf8PathBuf,
}

impl InstallLock {
    /// Block until the lock for `target` is held.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Lock`] if the lock file cannot be opened or
    /// locked.
    pub fn acquire(target: &Utf8Path) -> Result<Self, InstallError> {
        let (file, path) = open_lock_file(target)?;
        file.lock_exclusive()
            .map_err(|source| InstallError::Lock { path: path.clone(), source })?;
        Ok(Self { file, path })
    }

    /// Take the lock for `target` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Locked`] if another holder has it, or
    /// [`InstallError::Lock`] on other failures.
    pub fn try_acquire(target: &Utf8Path) -> Result<Self, InstallError> {
        let (file, path) = open_lock_file(target)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(InstallError::Locked { path })
            }
            Err(source) => Err(InstallError::Lock { path, source }),
        }
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            log::warn!("could not release lock {}: {err}", self.path);
        }
    }
}

fn open_lock_file(target: &Utf8Path) -> Result<(File, Utf8PathBuf), InstallError> {
    let path = InstallPaths::for_target(target)?.lock;
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|source| InstallError::Lock {
            path: path.clone(),
            source,
        })?;
    Ok((file, path))
}

fn remove_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_default_permissions(path: &Utf8Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}

/// Keep the current target reachable at the backup path.
#[cfg(unix)]
fn preserve_backup(paths: &InstallPaths) -> io::Result<()> {
    if let Err(err) = fs::hard_link(&paths.target, &paths.backup) {
        log::debug!("hard link to {} failed ({err}); copying", paths.backup);
        fs::copy(&paths.target, &paths.backup)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn preserve_backup(paths: &InstallPaths) -> io::Result<()> {
    fs::rename(&paths.target, &paths.backup)
}

/// Reverse [`preserve_backup`] after a failed swap.
#[cfg(unix)]
fn undo_backup(paths: &InstallPaths) -> io::Result<()> {
    remove_if_present(&paths.backup)
}

#[cfg(not(unix))]
fn undo_backup(paths: &InstallPaths) -> io::Result<()> {
    fs::rename(&paths.backup, &paths.target)
}

/// Park the backup under the retired name, replacing any stale one.
fn retire_backup(paths: &InstallPaths) -> io::Result<()> {
    if let Err(err) = remove_if_present(&paths.retired) {
        log::debug!("stale retired file {} not removed: {err}", paths.retired);
    }
    fs::rename(&paths.backup, &paths.retired)
}

/// Move the backup back over the target.
fn restore_backup(paths: &InstallPaths) -> io::Result<()> {
    #[cfg(not(unix))]
    remove_if_present(&paths.target)?;
    fs::rename(&paths.backup, &paths.target)
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
