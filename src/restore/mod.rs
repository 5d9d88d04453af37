//! Safe replacement of a live resource with its backup

pub mod coordinator;
pub mod copier;
pub mod digest;
pub mod lock;
pub mod mover;
pub mod paths;
pub mod process;

pub use coordinator::{
    AbortReason, FailurePhase, LiveState, RestoreCoordinator, RestoreFailure, RestoreOutcome,
    RestorePlan, RestoreRequest, RestoreSummary,
};
pub use copier::{BackupCopier, BackupKind, TreeCopier};
pub use digest::TreeDigest;
pub use lock::{LockError, RestoreLock};
pub use mover::{FsMover, ResourceMover};
pub use process::{ProcessChecker, StaticProcessChecker, SystemProcessChecker};
