use std::path::{Path, PathBuf};

use super::failure::FailureKind;
use super::pipeline::{Deploy, DeployResult};
use super::report::{DeployFailure, DeployReport, Stage};
use crate::error::Result;
use crate::paths;
use crate::strategy;
use crate::utils::shell;

#[derive(Debug)]
pub enum RollbackOutcome {
    /// One release or none: nothing was touched.
    NothingToRollBack,
    RolledBack(DeployReport),
}

impl<'a> Deploy<'a> {
    /// Point `current` back at the release before the newest one and drop
    /// the newest.
    pub fn rollback(mut self) -> DeployResult<RollbackOutcome> {
        let (rolled_back, previous) = match self.rollback_target() {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                log_status!("rollback", "Already at oldest release, nothing to roll back to.");
                return Ok(RollbackOutcome::NothingToRollBack);
            }
            Err(error) => {
                return Err(DeployFailure {
                    error,
                    report: self.report,
                })
            }
        };

        self.config = self.config.for_release(paths::release_name(&previous));
        self.report = DeployReport::new(self.config.release_name.clone());

        let result = self.rollback_steps(&rolled_back);
        self.finish(result).map(RollbackOutcome::RolledBack)
    }

    fn rollback_target(&self) -> Result<Option<(PathBuf, PathBuf)>> {
        let releases = self.config.all_releases()?;
        let Some(latest) = releases.last().filter(|_| releases.len() > 1) else {
            return Ok(None);
        };
        Ok(self
            .config
            .previous_release(latest)?
            .map(|previous| (latest.clone(), previous)))
    }

    fn rollback_steps(&mut self, rolled_back: &Path) -> Result<()> {
        let release = self.config.release_path();
        let revision = strategy::read_revision(&release)?;
        log_status!(
            "rollback",
            "Rolling back to previous release: {}",
            self.strategy.short_log_message(&revision)
        );
        self.report.revision = Some(revision);

        self.callback("before_symlink")?;
        if let Err(error) = self.symlink(&release) {
            return self.compensate(FailureKind::Pivot, error, Some(rolled_back));
        }
        self.report.advance(Stage::Symlinked);
        self.callback("after_symlink")?;
        self.report.advance(Stage::AfterHookRun);

        self.runner.sudo(&format!("rm -rf {}", shell::quote_path_arg(rolled_back)))?;
        self.bundle()?;

        log_status!("rollback", "Restarting with previous release.");
        self.conditionally_enable_maintenance()?;
        self.restart_with_callbacks()?;
        self.report.advance(Stage::Restarted);
        self.disable_maintenance()?;
        self.report.advance(Stage::MaintenanceDisabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use crate::roles::{Runner, Wrappers};
    use crate::server::{Inventory, Role};
    use crate::ssh::SshClient;
    use std::fs;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: DeployConfig,
        inventory: Inventory,
        wrappers: Wrappers,
    }

    fn fixture(releases: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::new("shop");
        config.deploy_to = Some(dir.path().to_path_buf());
        config.user = crate::utils::command::run("id", &["-un"], "user").unwrap();
        config.group = crate::utils::command::run("id", &["-gn"], "group").unwrap();
        config.restart_command = Some("true".to_string());
        config.strategy = crate::config::StrategyKind::Prepared;
        for name in releases {
            let release = config.release_dir().join(name);
            fs::create_dir_all(&release).unwrap();
            fs::write(release.join("REVISION"), format!("rev-{}\n", name)).unwrap();
        }
        if let Some(last) = releases.last() {
            std::os::unix::fs::symlink(config.release_dir().join(last), config.current_path())
                .unwrap();
        }
        Fixture {
            _dir: dir,
            config,
            inventory: Inventory::new(vec![Arc::new(SshClient::local(None, vec![Role::Solo]))]),
            wrappers: Wrappers {
                shell: vec!["sh".to_string(), "-c".to_string()],
                privileged: vec!["sh".to_string(), "-c".to_string()],
            },
        }
    }

    #[test]
    fn single_release_is_left_alone() {
        let f = fixture(&["20240101000000"]);
        let runner = Runner::new(&f.inventory, &f.wrappers);

        let outcome = Deploy::new(f.config.clone(), runner).rollback().unwrap();
        assert!(matches!(outcome, RollbackOutcome::NothingToRollBack));
        assert!(f.config.release_dir().join("20240101000000").is_dir());
        assert_eq!(
            fs::read_link(f.config.current_path()).unwrap(),
            f.config.release_dir().join("20240101000000")
        );
    }

    #[test]
    fn no_releases_is_nothing_to_roll_back() {
        let f = fixture(&[]);
        let runner = Runner::new(&f.inventory, &f.wrappers);
        let outcome = Deploy::new(f.config.clone(), runner).rollback().unwrap();
        assert!(matches!(outcome, RollbackOutcome::NothingToRollBack));
    }

    #[test]
    fn rolls_back_to_previous_release() {
        let f = fixture(&["20240101000000", "20240102000000", "20240103000000"]);
        let runner = Runner::new(&f.inventory, &f.wrappers);

        let outcome = Deploy::new(f.config.clone(), runner).rollback().unwrap();
        let RollbackOutcome::RolledBack(report) = outcome else {
            panic!("expected a rollback");
        };

        assert_eq!(report.release, "20240102000000");
        assert_eq!(report.revision.as_deref(), Some("rev-20240102000000"));
        assert_eq!(
            fs::read_link(f.config.current_path()).unwrap(),
            f.config.release_dir().join("20240102000000")
        );
        assert!(!f.config.release_dir().join("20240103000000").exists());
        assert!(f.config.release_dir().join("20240101000000").is_dir());
    }

    #[test]
    fn restart_failure_keeps_maintenance_page_up() {
        let mut f = fixture(&["20240101000000", "20240102000000"]);
        f.config.restart_command = Some("exit 1".to_string());
        f.config.migrate = true;
        let runner = Runner::new(&f.inventory, &f.wrappers);

        let failure = Deploy::new(f.config.clone(), runner).rollback().unwrap_err();
        assert!(failure.report.maintenance_up);
        assert!(failure.report.restart_failed);
        assert!(f.config.maintenance_page_path().is_file());
    }
}
