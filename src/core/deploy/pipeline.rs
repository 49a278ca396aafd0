use std::path::{Path, PathBuf};

use super::failure::{self, Compensation, FailureKind};
use super::maintenance::{self, WEB_ROLES};
use super::report::{DeployFailure, DeployReport, Outcome, Stage};
use super::{retention, services, shared};
use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::hooks;
use crate::overrides;
use crate::package_manager;
use crate::paths::{self, REVISION_FILE};
use crate::roles::Runner;
use crate::server::Role;
use crate::strategy::{self, Strategy};
use crate::utils::shell;

pub const MIGRATE_ROLES: &[Role] = &[Role::AppMaster, Role::Solo];

pub type DeployResult<T> = std::result::Result<T, DeployFailure>;

/// One deploy, restart or rollback invocation.
pub struct Deploy<'a> {
    pub(super) config: DeployConfig,
    pub(super) runner: Runner<'a>,
    pub(super) strategy: Box<dyn Strategy>,
    pub(super) report: DeployReport,
}

impl<'a> Deploy<'a> {
    pub fn new(config: DeployConfig, runner: Runner<'a>) -> Self {
        let strategy = strategy::for_config(&config);
        Self::with_strategy(config, runner, strategy)
    }

    pub fn with_strategy(
        config: DeployConfig,
        runner: Runner<'a>,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        let report = DeployReport::new(config.release_name.clone());
        Self {
            config,
            runner,
            strategy,
            report,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn report(&self) -> &DeployReport {
        &self.report
    }

    /// Update the repository cache, then run the full release pipeline.
    pub fn deploy(mut self) -> DeployResult<DeployReport> {
        let result = self.fetch().and_then(|_| self.release_steps());
        self.finish(result)
    }

    /// Release pipeline from whatever the repository cache holds now.
    pub fn cached_deploy(mut self) -> DeployResult<DeployReport> {
        let result = self.release_steps();
        self.finish(result)
    }

    /// Restart the latest release, behind the maintenance page when needed.
    pub fn restart_with_maintenance_page(mut self) -> DeployResult<DeployReport> {
        let result = self.restart_steps();
        self.finish(result)
    }

    fn release_steps(&mut self) -> Result<()> {
        tracing::debug!(
            "Deploying {} from cached copy at {}",
            self.config.app,
            chrono::Local::now().to_rfc2822()
        );
        overrides::apply_from_cache(&mut self.config)?;
        self.push()?;

        log_status!("deploy", "Starting full deploy");
        let release = self.config.release_path();
        self.ensure_new_release(&release)?;
        let restore = match self.protected_region(&release) {
            Ok(restore) => restore,
            Err(error) => return self.compensate(FailureKind::ProtectedRegion, error, None),
        };

        if let Err(error) = self.symlink(&release) {
            return self.compensate(FailureKind::Pivot, error, restore.as_deref());
        }
        self.report.advance(Stage::Symlinked);

        self.callback("after_symlink")?;
        self.report.advance(Stage::AfterHookRun);

        self.restart_with_callbacks()?;
        self.report.advance(Stage::Restarted);

        self.disable_maintenance()?;
        self.report.advance(Stage::MaintenanceDisabled);

        if let Err(error) = retention::cleanup_old_releases(&self.runner, &self.config) {
            self.report.cleanup_failed = true;
            self.compensate(FailureKind::Recoverable, error, None)?;
        }
        self.report.advance(Stage::CleanedUp);
        Ok(())
    }

    /// Copy through the before-symlink hook. Returns the release `current`
    /// goes back to if the switch fails.
    fn protected_region(&mut self, release: &Path) -> Result<Option<PathBuf>> {
        let restore = self.config.previous_release(release)?;

        self.copy_repository_cache(release)?;
        self.report.advance(Stage::Copied);

        self.create_revision_file(release)?;
        self.report.advance(Stage::Revisioned);

        self.callback("before_bundle")?;
        self.bundle()?;
        self.callback("after_bundle")?;
        self.report.advance(Stage::DependenciesInstalled);

        if let Err(error) = services::setup(&self.runner, &self.config, &mut self.report.warnings) {
            self.compensate(FailureKind::Recoverable, error, None)?;
        }
        self.report.advance(Stage::ServicesConfigured);

        shared::symlink_configs(&self.runner, &self.config, release)?;
        self.report.advance(Stage::ConfigsSymlinked);

        self.conditionally_enable_maintenance()?;

        self.callback("before_migrate")?;
        self.migrate()?;
        self.callback("after_migrate")?;
        self.report.advance(Stage::Migrated);

        self.callback("before_compile_assets")?;
        self.compile_assets()?;
        self.callback("after_compile_assets")?;
        self.report.advance(Stage::AssetsCompiled);

        self.callback("before_symlink")?;
        self.report.advance(Stage::BeforeHookRun);

        Ok(restore)
    }

    fn restart_steps(&mut self) -> Result<()> {
        overrides::apply_from_cache(&mut self.config)?;
        if let Some(latest) = self.config.latest_release()? {
            self.config = self.config.for_release(paths::release_name(&latest));
            self.report.release = self.config.release_name.clone();
        }

        self.conditionally_enable_maintenance()?;
        self.restart()?;
        self.report.advance(Stage::Restarted);
        self.disable_maintenance()?;
        self.report.advance(Stage::MaintenanceDisabled);
        Ok(())
    }

    fn fetch(&mut self) -> Result<()> {
        log_status!("deploy", "Updating repository cache");
        self.strategy.update_repository_cache()?;
        self.report.advance(Stage::Fetching);
        Ok(())
    }

    fn push(&mut self) -> Result<()> {
        log_status!("deploy", "Pushing code to all servers");
        self.runner.sync_directory(&self.config.repository_cache())?;
        self.report.advance(Stage::Pushed);
        Ok(())
    }

    /// Refuse a release name that is already on disk. Copying into it would
    /// overwrite a deployed release, and a later failure would quarantine it.
    fn ensure_new_release(&self, release: &Path) -> Result<()> {
        let check = format!("test ! -e {}", shell::quote_path_arg(release));
        if self.runner.probe(&check) {
            return Ok(());
        }

        Err(Error::config_invalid_value(
            "release_name",
            Some(self.config.release_name.clone()),
            format!("{} already exists", release.display()),
        ))
    }

    fn copy_repository_cache(&self, release: &Path) -> Result<()> {
        log_status!("deploy", "Copying to {}", release.display());
        self.runner.run(&copy_command(&self.config, release))?;

        log_status!("deploy", "Ensuring proper ownership.");
        self.runner.sudo(&format!(
            "chown -R {} {}",
            shell::quote_arg(&owner(&self.config)),
            shell::quote_path_arg(&self.config.deploy_to())
        ))
    }

    fn create_revision_file(&mut self, release: &Path) -> Result<()> {
        let revision = self.strategy.revision()?;
        log_status!(
            "deploy",
            "Deploying revision {}",
            self.strategy.short_log_message(&revision)
        );
        self.runner.run(&format!(
            "printf '%s\\n' {} > {}",
            shell::quote_arg(&revision),
            shell::quote_path_arg(&release.join(REVISION_FILE))
        ))?;
        self.report.revision = Some(revision);
        Ok(())
    }

    pub(super) fn bundle(&mut self) -> Result<()> {
        match package_manager::resolve(&self.config) {
            Some(manager) => {
                package_manager::bundle(manager.as_ref(), &self.runner, &mut self.report.warnings)
            }
            None => {
                tracing::debug!(
                    "No dependency manifest in {}",
                    self.config.release_path().display()
                );
                Ok(())
            }
        }
    }

    fn migrate(&mut self) -> Result<()> {
        if !self.config.migrate {
            return Ok(());
        }
        self.report.migrations_reached = true;
        let command = framework_command(&self.config, &self.config.migration_command);
        log_status!("deploy", "Migrating: {}", command);
        self.runner.with_roles(MIGRATE_ROLES, |scoped| scoped.run(&command))
    }

    fn compile_assets(&mut self) -> Result<()> {
        if !self.config.precompile_assets {
            return Ok(());
        }
        let command = framework_command(&self.config, &self.config.asset_command);
        log_status!("deploy", "Compiling assets: {}", command);
        self.runner.with_roles(WEB_ROLES, |scoped| scoped.run(&command))
    }

    pub(super) fn callback(&mut self, name: &str) -> Result<()> {
        self.report.callbacks_reached = true;
        hooks::run_hook(&self.runner, &self.config, name)
    }

    pub(super) fn symlink(&mut self, release: &Path) -> Result<()> {
        log_status!("deploy", "Symlinking code.");
        self.runner.run(&symlink_command(&self.config, release))?;
        self.report.symlink_changed = true;
        Ok(())
    }

    pub(super) fn conditionally_enable_maintenance(&mut self) -> Result<()> {
        if !self.config.requires_maintenance_page() {
            return Ok(());
        }
        self.report.maintenance_up = true;
        maintenance::enable(&self.runner, &self.config)?;
        self.report.advance(Stage::MaintenanceEnabled);
        Ok(())
    }

    pub(super) fn disable_maintenance(&mut self) -> Result<()> {
        maintenance::disable(&self.runner, &self.config)?;
        self.report.maintenance_up = false;
        Ok(())
    }

    fn restart_servers(&self) -> Result<()> {
        log_status!("deploy", "Restarting app servers");
        let command = self.config.restart_command();
        self.runner.with_roles(WEB_ROLES, |scoped| scoped.run(&command))
    }

    fn restart(&mut self) -> Result<()> {
        self.report.restart_failed = true;
        self.restart_servers()?;
        self.report.restart_failed = false;
        Ok(())
    }

    /// `restart_failed` stays set until the after-restart hook has run.
    pub(super) fn restart_with_callbacks(&mut self) -> Result<()> {
        self.report.restart_failed = true;
        self.callback("before_restart")?;
        self.restart_servers()?;
        self.callback("after_restart")?;
        self.report.restart_failed = false;
        Ok(())
    }

    pub(super) fn compensate(
        &mut self,
        kind: FailureKind,
        error: Error,
        restore: Option<&Path>,
    ) -> Result<()> {
        let release = self.config.release_path();
        failure::compensate(
            kind,
            error,
            &self.runner,
            &self.config,
            Compensation {
                release: &release,
                restore,
            },
            &mut self.report,
        )
    }

    pub(super) fn finish(mut self, result: Result<()>) -> DeployResult<DeployReport> {
        match result {
            Ok(()) => {
                self.report.outcome = Outcome::Succeeded;
                self.report.advance(Stage::Done);
                tracing::debug!(
                    "Finished {} at {}",
                    self.report.release,
                    chrono::Local::now().to_rfc2822()
                );
                Ok(self.report)
            }
            Err(error) => {
                if self.report.outcome == Outcome::InProgress {
                    self.report.outcome = Outcome::Failed;
                }
                tracing::debug!(
                    "Finished failing {} at {}",
                    self.report.release,
                    chrono::Local::now().to_rfc2822()
                );
                self.report.log_postmortem();
                Err(DeployFailure {
                    error,
                    report: self.report,
                })
            }
        }
    }
}

fn owner(config: &DeployConfig) -> String {
    format!("{}:{}", config.user, config.group)
}

/// Copy the repository cache into `release` on each host, minus `.git` and
/// the configured exclusions.
pub fn copy_command(config: &DeployConfig, release: &Path) -> String {
    let mut excludes = vec!["--exclude=.git".to_string()];
    excludes.extend(
        config
            .copy_exclude
            .iter()
            .map(|pattern| shell::quote_arg(&format!("--exclude={}", pattern))),
    );

    format!(
        "mkdir -p {release} {failed} && (cd {cache} && tar cf - {excludes} .) | (cd {release} && tar xf -)",
        release = shell::quote_path_arg(release),
        failed = shell::quote_path_arg(&config.failed_release_dir()),
        cache = shell::quote_path_arg(&config.repository_cache()),
        excludes = excludes.join(" "),
    )
}

pub fn symlink_command(config: &DeployConfig, release: &Path) -> String {
    let current = shell::quote_path_arg(&config.current_path());
    format!(
        "rm -f {current} && ln -nfs {release} {current} && chown -R {owner} {current}",
        current = current,
        release = shell::quote_path_arg(release),
        owner = shell::quote_arg(&owner(config)),
    )
}

/// `command` run from the release with binstubs and framework env in place.
pub fn framework_command(config: &DeployConfig, command: &str) -> String {
    format!(
        "cd {} && PATH={}:$PATH {} {}",
        shell::quote_path_arg(&config.release_path()),
        shell::quote_path_arg(&config.binstubs_path()),
        config.framework_envs(),
        command
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        let mut config = DeployConfig::new("shop").for_release("20240101000000");
        config.deploy_to = Some(PathBuf::from("/data/shop"));
        config.user = "deploy".to_string();
        config.group = "deploy".to_string();
        config
    }

    #[test]
    fn copy_excludes_git_and_configured_patterns() {
        let mut config = config();
        config.copy_exclude = vec!["spec".to_string(), "*.log".to_string()];
        let command = copy_command(&config, &config.release_path());

        assert!(command.starts_with(
            "mkdir -p /data/shop/releases/20240101000000 /data/shop/releases_failed && "
        ));
        assert!(command.contains("tar cf - --exclude=.git --exclude=spec '--exclude=*.log' ."));
        assert!(command.ends_with("(cd /data/shop/releases/20240101000000 && tar xf -)"));
    }

    #[test]
    fn symlink_replaces_current_and_fixes_owner() {
        let config = config();
        assert_eq!(
            symlink_command(&config, &config.release_path()),
            "rm -f /data/shop/current && ln -nfs /data/shop/releases/20240101000000 /data/shop/current \
             && chown -R deploy:deploy /data/shop/current"
        );
    }

    #[test]
    fn framework_command_runs_from_release_with_binstubs() {
        let config = config();
        let command = framework_command(&config, "rake db:migrate");
        assert!(command.starts_with(
            "cd /data/shop/releases/20240101000000 && \
             PATH=/data/shop/releases/20240101000000/bundler_binstubs:$PATH RAILS_ENV=production"
        ));
        assert!(command.ends_with("MERB_ENV=production rake db:migrate"));
    }
}
