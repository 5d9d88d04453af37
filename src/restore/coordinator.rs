//! Restore coordinator
//!
//! Replaces a live resource with its backup without ever leaving the live
//! path's data unrecoverable:
//!
//! 1. Preconditions (no mutation): path sanity, blocking process, backup present
//!    and readable. Overlap between live and backup is checked both lexically
//!    and after following symlinks.
//! 2. Stage: copy the backup into a hidden directory beside the live path
//! 3. Verify: the staged tree must hash the same as the backup
//! 4. Displace: rename the live resource aside (atomic, same directory)
//! 5. Commit: rename the staged copy onto the live path, rolling back on failure
//! 6. Cleanup: delete the displaced copy unless asked to keep it

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::copier::{self, BackupCopier, BackupKind, TreeCopier};
use super::digest::TreeDigest;
use super::mover::{FsMover, ResourceMover};
use super::paths;
use super::process::ProcessChecker;

/// What to restore and from where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// The resource currently in use
    pub live_path: PathBuf,
    /// The saved copy that should replace it
    pub backup_path: PathBuf,
    /// Refuse to run while a process with this name is alive
    pub blocking_process: Option<String>,
    /// Leave the replaced live resource on disk instead of deleting it
    pub keep_previous: bool,
}

impl RestoreRequest {
    pub fn new(live_path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            live_path: live_path.into(),
            backup_path: backup_path.into(),
            blocking_process: None,
            keep_previous: false,
        }
    }

    pub fn block_if_running(mut self, name: impl Into<String>) -> Self {
        self.blocking_process = Some(name.into());
        self
    }

    pub fn keep_previous(mut self, keep: bool) -> Self {
        self.keep_previous = keep;
        self
    }
}

/// Why a restore was refused before anything was touched
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("process still running: {name}")]
    ProcessRunning { name: String },

    #[error("could not check whether {name} is running: {detail}")]
    ProcessCheckFailed { name: String, detail: String },

    #[error("no backup found at {}", path.display())]
    NoBackup { path: PathBuf },

    #[error("backup at {} is neither a directory nor a .tar.gz archive", path.display())]
    UnsupportedBackup { path: PathBuf },

    #[error("live path has no final component: {}", path.display())]
    InvalidLivePath { path: PathBuf },

    #[error("live and backup paths are the same: {}", path.display())]
    SamePath { path: PathBuf },

    #[error("backup {} is inside the live resource {}", backup.display(), live.display())]
    BackupInsideLive { live: PathBuf, backup: PathBuf },

    #[error("live resource {} is inside the backup {}", live.display(), backup.display())]
    LiveInsideBackup { live: PathBuf, backup: PathBuf },

    #[error("could not resolve path {}: {detail}", path.display())]
    UnresolvablePath { path: PathBuf, detail: String },

    #[error("could not read backup at {}: {detail}", path.display())]
    UnreadableBackup { path: PathBuf, detail: String },
}

/// Step of the destructive phase that went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// Copying the backup into the staging directory
    Stage,
    /// Staged copy did not match the backup
    Verify,
    /// Moving the existing live resource out of the way
    RemoveLive,
    /// Moving the staged copy onto the live path
    Commit,
}

impl FailurePhase {
    pub fn message(&self) -> &'static str {
        match self {
            FailurePhase::Stage => "could not copy backup resource",
            FailurePhase::Verify => "staged copy does not match backup resource",
            FailurePhase::RemoveLive => "could not remove live resource",
            FailurePhase::Commit => "could not move staged copy into place",
        }
    }
}

/// Where the live resource's original data is after a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveState {
    /// The live path was never modified
    Untouched,
    /// The live resource was moved aside and then moved back
    RolledBack,
    /// Rollback failed; the original data sits at `previous`
    Displaced { previous: PathBuf },
}

/// A restore that entered the destructive phase and did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{}: {detail}", phase.message())]
pub struct RestoreFailure {
    pub phase: FailurePhase,
    pub live_state: LiveState,
    pub detail: String,
}

/// Result of a completed restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub live_path: PathBuf,
    pub backup_kind: BackupKind,
    /// Digest of the tree now at the live path
    pub digest: TreeDigest,
    /// Whether a live resource existed and was replaced
    pub replaced_existing: bool,
    /// Where the replaced resource still lives, if it was kept or could not be deleted
    pub previous: Option<PathBuf>,
}

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Success(RestoreSummary),
    Aborted(AbortReason),
    Failed(RestoreFailure),
}

impl RestoreOutcome {
    /// Process exit code: 0 success, 1 aborted, 2 failed
    pub fn exit_code(&self) -> u8 {
        match self {
            RestoreOutcome::Success(_) => 0,
            RestoreOutcome::Aborted(_) => 1,
            RestoreOutcome::Failed(_) => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RestoreOutcome::Success(_))
    }
}

/// What a restore would do, as determined without touching anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorePlan {
    pub live_path: PathBuf,
    pub backup_path: PathBuf,
    pub backup_kind: BackupKind,
    /// Size of the backup on disk in bytes
    pub backup_bytes: u64,
    /// Whether a live resource exists and would be replaced
    pub replaces_existing: bool,
    /// Directory the staging copy would be created in
    pub staging_parent: PathBuf,
    /// Whether the staging parent has to be created first
    pub creates_parent: bool,
}

/// Preconditions that passed, with normalized paths
#[derive(Debug)]
struct Checked {
    live: PathBuf,
    backup: PathBuf,
    parent: PathBuf,
    live_name: String,
    kind: BackupKind,
    /// Digest the staged copy must match; archives are only checked for readability
    expected: Option<TreeDigest>,
    backup_bytes: u64,
}

/// Swaps a live resource for its backup
pub struct RestoreCoordinator<P, C = TreeCopier, M = FsMover> {
    checker: P,
    copier: C,
    mover: M,
}

impl<P: ProcessChecker> RestoreCoordinator<P> {
    pub fn new(checker: P) -> Self {
        Self {
            checker,
            copier: TreeCopier,
            mover: FsMover,
        }
    }
}

impl<P: ProcessChecker, C: BackupCopier, M: ResourceMover> RestoreCoordinator<P, C, M> {
    /// Use a different copier for the staging step
    pub fn with_copier<C2: BackupCopier>(self, copier: C2) -> RestoreCoordinator<P, C2, M> {
        RestoreCoordinator {
            checker: self.checker,
            copier,
            mover: self.mover,
        }
    }

    /// Use a different mover for the displace, commit and rollback renames
    pub fn with_mover<M2: ResourceMover>(self, mover: M2) -> RestoreCoordinator<P, C, M2> {
        RestoreCoordinator {
            checker: self.checker,
            copier: self.copier,
            mover,
        }
    }

    /// Run the preconditions only and report what `restore` would do
    pub fn plan(&self, request: &RestoreRequest) -> Result<RestorePlan, AbortReason> {
        let checked = self.check(request)?;

        Ok(RestorePlan {
            replaces_existing: checked.live.symlink_metadata().is_ok(),
            creates_parent: !checked.parent.exists(),
            live_path: checked.live,
            backup_path: checked.backup,
            backup_kind: checked.kind,
            backup_bytes: checked.backup_bytes,
            staging_parent: checked.parent,
        })
    }

    /// Replace the live resource with the backup
    pub fn restore(&self, request: &RestoreRequest) -> RestoreOutcome {
        let checked = match self.check(request) {
            Ok(c) => c,
            Err(reason) => {
                info!(%reason, "Restore aborted");
                return RestoreOutcome::Aborted(reason);
            }
        };

        match self.swap(&checked, request.keep_previous) {
            Ok(summary) => {
                info!(
                    live = %summary.live_path.display(),
                    files = summary.digest.files,
                    bytes = summary.digest.bytes,
                    "Restore complete"
                );
                RestoreOutcome::Success(summary)
            }
            Err(failure) => {
                warn!(
                    phase = ?failure.phase,
                    live_state = ?failure.live_state,
                    detail = %failure.detail,
                    "Restore failed"
                );
                RestoreOutcome::Failed(failure)
            }
        }
    }

    fn check(&self, request: &RestoreRequest) -> Result<Checked, AbortReason> {
        let live = resolve(&request.live_path)?;
        let backup = resolve(&request.backup_path)?;

        let Some(live_name) = live.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return Err(AbortReason::InvalidLivePath { path: live });
        };
        let Some(parent) = live.parent().map(Path::to_path_buf) else {
            return Err(AbortReason::InvalidLivePath { path: live });
        };

        check_overlap(&live, &backup)?;

        // The live resource itself is not followed: a symlink there is what gets replaced
        let resolved_live = resolve_links(&parent)?.join(&live_name);
        let resolved_backup = resolve_links(&backup)?;
        if resolved_live != live || resolved_backup != backup {
            debug!(
                live = %resolved_live.display(),
                backup = %resolved_backup.display(),
                "Checking resolved paths"
            );
            check_overlap(&resolved_live, &resolved_backup)?;
        }

        if let Some(name) = &request.blocking_process {
            match self.checker.is_running(name) {
                Ok(true) => {
                    return Err(AbortReason::ProcessRunning { name: name.clone() });
                }
                Ok(false) => debug!(process = %name, "Blocking process not running"),
                Err(e) => {
                    return Err(AbortReason::ProcessCheckFailed {
                        name: name.clone(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        if backup.symlink_metadata().is_err() {
            return Err(AbortReason::NoBackup { path: backup });
        }
        let kind = BackupKind::detect(&backup)
            .ok_or_else(|| AbortReason::UnsupportedBackup { path: backup.clone() })?;

        let unreadable = |e: io::Error| AbortReason::UnreadableBackup {
            path: backup.clone(),
            detail: e.to_string(),
        };
        let (expected, backup_bytes) = match kind {
            BackupKind::Directory => {
                let digest = TreeDigest::compute(&backup).map_err(unreadable)?;
                let bytes = digest.bytes;
                (Some(digest), bytes)
            }
            BackupKind::Archive => (None, fs::metadata(&backup).map_err(unreadable)?.len()),
        };

        Ok(Checked {
            live,
            backup,
            parent,
            live_name,
            kind,
            expected,
            backup_bytes,
        })
    }

    fn swap(&self, checked: &Checked, keep_previous: bool) -> Result<RestoreSummary, RestoreFailure> {
        let untouched = |phase: FailurePhase, detail: String| RestoreFailure {
            phase,
            live_state: LiveState::Untouched,
            detail,
        };

        // Stage. The TempDir removes a partial copy on every early return.
        fs::create_dir_all(&checked.parent)
            .map_err(|e| untouched(FailurePhase::Stage, e.to_string()))?;
        let staged = tempfile::Builder::new()
            .prefix(&paths::staging_prefix(&checked.live_name))
            .tempdir_in(&checked.parent)
            .map_err(|e| untouched(FailurePhase::Stage, e.to_string()))?;
        info!(staged = %staged.path().display(), "Staging backup");

        self.copier
            .copy_into(&checked.backup, checked.kind, staged.path())
            .map_err(|e| untouched(FailurePhase::Stage, e.to_string()))?;
        // The staging dir is created private; give it the mode the live root should have
        staged_root_permissions(checked)
            .and_then(|permissions| fs::set_permissions(staged.path(), permissions))
            .map_err(|e| untouched(FailurePhase::Stage, e.to_string()))?;

        // Verify
        let digest = TreeDigest::compute(staged.path())
            .map_err(|e| untouched(FailurePhase::Verify, e.to_string()))?;
        if let Some(expected) = &checked.expected {
            if *expected != digest {
                return Err(untouched(
                    FailurePhase::Verify,
                    format!("expected {}, staged {}", expected.hash, digest.hash),
                ));
            }
        }
        debug!(hash = %digest.hash, files = digest.files, "Staged copy verified");

        // Displace
        let replaced_existing = checked.live.symlink_metadata().is_ok();
        let displaced = if replaced_existing {
            let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
            let aside = paths::displaced_path(&checked.parent, &checked.live_name, &timestamp);
            self.mover
                .rename(&checked.live, &aside)
                .map_err(|e| untouched(FailurePhase::RemoveLive, e.to_string()))?;
            debug!(aside = %aside.display(), "Moved live resource aside");
            Some(aside)
        } else {
            None
        };

        // Commit. After a successful rename the TempDir's own cleanup finds
        // nothing at its path and does nothing.
        if let Err(e) = self.mover.rename(staged.path(), &checked.live) {
            let live_state = match &displaced {
                None => LiveState::Untouched,
                Some(aside) => match self.mover.rename(aside, &checked.live) {
                    Ok(()) => LiveState::RolledBack,
                    Err(rollback) => {
                        warn!(
                            aside = %aside.display(),
                            error = %rollback,
                            "Could not move live resource back"
                        );
                        LiveState::Displaced {
                            previous: aside.clone(),
                        }
                    }
                },
            };
            return Err(RestoreFailure {
                phase: FailurePhase::Commit,
                live_state,
                detail: e.to_string(),
            });
        }
        drop(staged);

        // Cleanup
        let previous = match displaced {
            Some(aside) if keep_previous => Some(aside),
            Some(aside) => match remove_any(&aside) {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        aside = %aside.display(),
                        error = %e,
                        "Restore succeeded but the previous copy could not be deleted"
                    );
                    Some(aside)
                }
            },
            None => None,
        };

        Ok(RestoreSummary {
            live_path: checked.live.clone(),
            backup_kind: checked.kind,
            digest,
            replaced_existing,
            previous,
        })
    }
}

fn resolve(path: &Path) -> Result<PathBuf, AbortReason> {
    paths::normalize_path(path).map_err(|e| AbortReason::UnresolvablePath {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn resolve_links(path: &Path) -> Result<PathBuf, AbortReason> {
    paths::resolve_links(path).map_err(|e| AbortReason::UnresolvablePath {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn check_overlap(live: &Path, backup: &Path) -> Result<(), AbortReason> {
    if live == backup {
        return Err(AbortReason::SamePath {
            path: live.to_path_buf(),
        });
    }
    if paths::is_within(backup, live) {
        return Err(AbortReason::BackupInsideLive {
            live: live.to_path_buf(),
            backup: backup.to_path_buf(),
        });
    }
    if paths::is_within(live, backup) {
        return Err(AbortReason::LiveInsideBackup {
            live: live.to_path_buf(),
            backup: backup.to_path_buf(),
        });
    }
    Ok(())
}

/// Mode for the restored root
///
/// A directory backup lends its own. An archive uses its `.` entry when it
/// has one, otherwise whatever the live directory had, otherwise the parent's.
fn staged_root_permissions(checked: &Checked) -> io::Result<fs::Permissions> {
    match checked.kind {
        BackupKind::Directory => Ok(fs::metadata(&checked.backup)?.permissions()),
        BackupKind::Archive => {
            if let Some(permissions) = copier::archive_root_permissions(&checked.backup)? {
                return Ok(permissions);
            }
            match fs::metadata(&checked.live) {
                Ok(metadata) if metadata.is_dir() => Ok(metadata.permissions()),
                _ => Ok(fs::metadata(&checked.parent)?.permissions()),
            }
        }
    }
}

/// Remove a directory tree, a file or a symlink
fn remove_any(path: &Path) -> io::Result<()> {
    if path.symlink_metadata()?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
