//! Release pipeline.
//!
//! A deploy walks a fixed list of steps on every host. Each step either
//! completes everywhere or the attempt stops, with cleanup picked by the
//! step's [`FailureKind`]:
//!
//! - push fails: nothing on the hosts has changed
//! - copy through `before_symlink` fails: the release moves to `releases_failed/`
//! - the symlink switch fails: `current` goes back to the previous release
//! - services setup or cleanup fails: a warning, the deploy carries on
//!
//! Whatever happens, the caller gets a [`DeployReport`] describing how far it got.

pub mod failure;
pub mod maintenance;
mod pipeline;
pub mod report;
pub mod retention;
mod rollback;
pub mod services;
pub mod shared;

pub use failure::FailureKind;
pub use pipeline::{
    copy_command, framework_command, symlink_command, Deploy, DeployResult, MIGRATE_ROLES,
};
pub use report::{DeployFailure, DeployReport, Outcome, Stage};
pub use rollback::RollbackOutcome;
