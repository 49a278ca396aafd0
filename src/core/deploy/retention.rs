//! Release history pruning.
//!
//! Release directory names sort chronologically, so "newest N" is "last N
//! by name". Pruning is idempotent.

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::roles::Runner;
use crate::utils::shell;

/// Command removing all but the `keep` newest entries of `dir`. A missing
/// `dir` is a no-op; a listing failure is the command's exit status.
pub fn prune_command(dir: &Path, keep: usize) -> String {
    let dir = shell::quote_path_arg(dir);
    format!(
        "if [ -d {dir} ]; then entries=$(ls -r {dir}) || exit 1; \
         [ -z \"$entries\" ] || printf '%s\\n' \"$entries\" | tail -n +{start} | xargs -I@ rm -rf {dir}/@; fi",
        dir = dir,
        start = keep + 1
    )
}

pub fn clean_release_directory(runner: &Runner, dir: &Path, keep: usize) -> Result<()> {
    log_status!("deploy", "Cleaning release directory: {}", dir.display());
    runner.sudo(&prune_command(dir, keep))
}

pub fn cleanup_old_releases(runner: &Runner, config: &DeployConfig) -> Result<()> {
    clean_release_directory(runner, &config.release_dir(), config.keep_releases)?;
    clean_release_directory(runner, &config.failed_release_dir(), config.keep_releases)
}
