//! External services configuration. Best effort: a deploy never fails here.

use crate::config::DeployConfig;
use crate::error::Result;
use crate::logging::Warnings;
use crate::roles::Runner;

pub const STALE_CONFIG_WARNING: &str = "External services configuration not updated. Using previous version.\n\
Deploy again if your services configuration appears incomplete or out of date.";

/// Refresh the services file if the hosts can. Falls back to whatever was
/// configured before; only warns when there was something before.
pub fn setup(runner: &Runner, config: &DeployConfig, warnings: &mut Warnings) -> Result<()> {
    log_status!("deploy", "Setting up external services.");
    let previously_configured = config.configured_services()?;

    if !runner.probe_privileged(&config.services_check_command) {
        log_status!(
            "deploy",
            "Could not setup services. Upgrade your environment to get services configuration."
        );
        return Ok(());
    }

    if let Err(error) = runner.sudo(&config.services_setup_command()) {
        if previously_configured.is_empty() {
            tracing::debug!("services setup failed with nothing configured: {}", error);
        } else {
            warnings.push(format!("{}\n{}", STALE_CONFIG_WARNING, error.message));
        }
    }

    Ok(())
}
