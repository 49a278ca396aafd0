//! Failure classification and compensation.

use std::path::Path;

use super::report::{DeployReport, Outcome};
use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::paths;
use crate::roles::Runner;
use crate::utils::shell;

/// How a failing step is cleaned up after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Recorded as a warning; the pipeline continues.
    Recoverable,
    /// Between copy and the before-symlink hook: the release is quarantined.
    ProtectedRegion,
    /// The symlink switch: `current` is pointed back.
    Pivot,
    /// Nothing to undo.
    Fatal,
}

impl FailureKind {
    pub fn outcome(&self) -> Outcome {
        match self {
            FailureKind::Recoverable => Outcome::InProgress,
            FailureKind::ProtectedRegion => Outcome::FailedBeforeSymlink,
            FailureKind::Pivot => Outcome::FailedAtSymlink,
            FailureKind::Fatal => Outcome::Failed,
        }
    }
}

/// Where `current` goes back to if the switch fails.
#[derive(Debug, Clone, Copy)]
pub struct Compensation<'p> {
    pub release: &'p Path,
    pub restore: Option<&'p Path>,
}

/// Apply the compensation for `kind` after `error`.
///
/// Returns `Ok(())` when the pipeline may continue (recoverable), otherwise
/// the original error. A failing compensation is logged, never returned.
pub fn compensate(
    kind: FailureKind,
    error: Error,
    runner: &Runner,
    config: &DeployConfig,
    target: Compensation<'_>,
    report: &mut DeployReport,
) -> Result<()> {
    match kind {
        FailureKind::Recoverable => {
            report.warnings.push(error.message);
            return Ok(());
        }
        FailureKind::ProtectedRegion => {
            if let Err(undo) = quarantine_release(runner, config, target.release) {
                log_compensation_failure("quarantine", &undo);
            }
        }
        FailureKind::Pivot => {
            if let Err(undo) = revert_symlink(runner, config, target.restore) {
                log_compensation_failure("symlink revert", &undo);
            }
            report.symlink_changed = false;
        }
        FailureKind::Fatal => {}
    }

    report.outcome = kind.outcome();
    Err(error)
}

fn log_compensation_failure(what: &str, error: &Error) {
    tracing::error!("{} failed, leaving things as they are: {}", what, error.message);
}

/// Move a half-built release out of `releases/` so it is never promoted.
pub fn quarantine_release(runner: &Runner, config: &DeployConfig, release: &Path) -> Result<()> {
    let failed_dir = config.failed_release_dir();
    log_status!(
        "deploy",
        "Release {} failed, saving release to {}.",
        release.display(),
        failed_dir.display()
    );
    // A stale copy under the same name would swallow the release as a subdirectory.
    runner.sudo(&format!(
        "mkdir -p {dir} && if [ -e {release} ]; then rm -rf {target} && mv {release} {dir}/; fi",
        dir = shell::quote_path_arg(&failed_dir),
        release = shell::quote_path_arg(release),
        target = shell::quote_path_arg(&failed_dir.join(paths::release_name(release))),
    ))
}

/// Point `current` at `restore`, or remove it when there is nothing to restore.
pub fn revert_symlink(
    runner: &Runner,
    config: &DeployConfig,
    restore: Option<&Path>,
) -> Result<()> {
    let current = shell::quote_path_arg(&config.current_path());
    let command = match restore {
        Some(previous) => {
            log_status!("deploy", "Restoring current to {}", previous.display());
            format!(
                "rm -f {current} && ln -nfs {previous} {current} && chown -R {owner} {current}",
                current = current,
                previous = shell::quote_path_arg(previous),
                owner = shell::quote_arg(&format!("{}:{}", config.user, config.group)),
            )
        }
        None => {
            log_status!(
                "deploy",
                "No previous release, removing {}",
                config.current_path().display()
            );
            format!("rm -f {}", current)
        }
    };
    runner.sudo(&command)
}
