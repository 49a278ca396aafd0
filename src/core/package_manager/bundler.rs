use std::path::Path;

use super::lockfile::{Lockfile, DEFAULT_BUNDLER_VERSION};
use super::PackageManager;
use crate::config::DeployConfig;
use crate::error::Result;
use crate::logging::Warnings;
use crate::roles::Runner;
use crate::utils::{io, shell};

const MISSING_LOCKFILE: &str = "Gemfile.lock is missing! \
Gem versions in production may differ from what you tested with, and may change on \
every deploy even if the Gemfile hasn't. Commit Gemfile.lock and redeploy.";

const NO_DATABASE_ADAPTER: &str = "Gemfile.lock does not contain a recognized database \
adapter (mysql2, mysql, do_mysql, pg, do_postgres). Apps that use MySQL or PostgreSQL \
may fail to boot; add the adapter to your Gemfile, bundle, commit and redeploy.";

pub(super) fn required(release_path: &Path) -> bool {
    release_path.join("Gemfile").exists()
}

pub(super) fn build(config: &DeployConfig) -> Box<dyn PackageManager> {
    Box::new(Bundler::new(config))
}

pub struct Bundler {
    config: DeployConfig,
    lockfile: Option<Lockfile>,
}

impl Bundler {
    pub fn new(config: &DeployConfig) -> Self {
        // An unreadable lockfile is treated like a missing one.
        let lockfile = io::read_file_optional(&config.lockfile_path(), "read Gemfile.lock")
            .ok()
            .flatten()
            .map(|content| Lockfile::parse(&content));

        Self {
            config: config.clone(),
            lockfile,
        }
    }

    pub fn bundler_version(&self) -> &str {
        self.lockfile
            .as_ref()
            .map(Lockfile::bundler_version)
            .unwrap_or(DEFAULT_BUNDLER_VERSION)
    }

    pub fn installed_check_command(&self) -> String {
        // "bundler " skips gems like bundler08; "[,)]" stops 0.9.2 matching 0.9.22.
        format!(
            "gem list bundler | grep \"bundler \" | egrep -q '{}[,)]'",
            self.bundler_version().replace('.', "\\.")
        )
    }

    pub fn bundler_options(&self) -> String {
        let c = &self.config;
        let mut options = format!(
            "--gemfile {} --path {} --binstubs {} --without {}",
            shell::quote_path_arg(&c.gemfile_path()),
            shell::quote_path_arg(&c.bundled_gems_path()),
            shell::quote_path_arg(&c.binstubs_path()),
            shell::quote_arg(&c.bundle_without),
        );

        // Deployment mode needs a lockfile.
        if self.lockfile.is_some() {
            options.push_str(" --deployment");
        }

        options
    }

    fn check_repository(&self, warnings: &mut Warnings) {
        log_status!("deploy", "Gemfile found.");
        match &self.lockfile {
            Some(lockfile) => {
                log_status!("deploy", "Gemfile.lock found.");
                if !lockfile.any_database_adapter() {
                    warnings.push(NO_DATABASE_ADAPTER);
                }
            }
            None => warnings.push(MISSING_LOCKFILE),
        }
    }

    fn check_services_client(&self, warnings: &mut Warnings) -> Result<()> {
        let Some(lockfile) = &self.lockfile else {
            return Ok(());
        };

        let services = self.config.configured_services()?;
        if !services.is_empty() && !lockfile.has_gem(&self.config.services_client) {
            warnings.push(format!(
                "Gemfile.lock does not contain {}. Add it to get access to: {}.",
                self.config.services_client,
                services.join(", ")
            ));
        }
        Ok(())
    }

    fn setup_sqlite3_if_necessary(&self, runner: &Runner) -> Result<()> {
        if !self.lockfile.as_ref().is_some_and(Lockfile::uses_sqlite3) {
            return Ok(());
        }

        let c = &self.config;
        let databases = c.shared_path().join("databases");
        let database = databases.join(format!("{}.sqlite3", c.framework_env));
        let release_config = c.release_path().join("config");
        let sqlite_yml = c.shared_config_path().join("database.sqlite3.yml");

        let steps = [
            (
                "Create databases directory if needed",
                format!("mkdir -p {}", shell::quote_path_arg(&databases)),
            ),
            (
                "Creating SQLite database if needed",
                format!("touch {}", shell::quote_path_arg(&database)),
            ),
            (
                "Create config directory if needed",
                format!(
                    "mkdir -p {} {}",
                    shell::quote_path_arg(&release_config),
                    shell::quote_path_arg(&c.shared_config_path())
                ),
            ),
            (
                "Generating SQLite config",
                format!(
                    "cat > {} <<'YML'\n{}:\n  adapter: sqlite3\n  database: {}\n  pool: 5\n  timeout: 5000\nYML",
                    shell::quote_path_arg(&sqlite_yml),
                    c.framework_env,
                    database.display()
                ),
            ),
            (
                "Symlink database.yml",
                format!(
                    "ln -nfs {} {}",
                    shell::quote_path_arg(&sqlite_yml),
                    shell::quote_path_arg(&release_config.join("database.yml"))
                ),
            ),
        ];

        for (what, command) in &steps {
            log_status!("deploy", "{}", what);
            runner.run(command)?;
        }

        let owner = format!("{}:{}", c.user, c.group);
        log_status!("deploy", "Setting ownership to {}", owner);
        runner.sudo(&format!(
            "chown -R {} {}",
            shell::quote_arg(&owner),
            shell::quote_path_arg(&c.release_path())
        ))
    }

    /// Bundled gems built for another runtime or machine are useless.
    fn clean_bundle_on_system_version_change(&self, runner: &Runner) -> Result<()> {
        let c = &self.config;
        // diff exits 0 when equal, non-zero when different or missing.
        let check_ruby = format!(
            "{} | diff - {} >/dev/null 2>&1",
            c.ruby_version_command,
            shell::quote_path_arg(&c.ruby_version_file())
        );
        let check_system = format!(
            "{} | diff - {} >/dev/null 2>&1",
            c.system_version_command,
            shell::quote_path_arg(&c.system_version_file())
        );
        let clean = format!(
            "echo 'New deploy or system version change detected, cleaning bundled gems.' && rm -Rf {}",
            shell::quote_path_arg(&c.bundled_gems_path())
        );

        runner.run(&format!("{} && {} || ({})", check_ruby, check_system, clean))
    }

    fn write_system_version(&self, runner: &Runner) -> Result<()> {
        let c = &self.config;
        runner.run(&format!(
            "mkdir -p {} && {} > {} && {} > {}",
            shell::quote_path_arg(&c.bundled_gems_path()),
            c.ruby_version_command,
            shell::quote_path_arg(&c.ruby_version_file()),
            c.system_version_command,
            shell::quote_path_arg(&c.system_version_file())
        ))
    }

    /// Environment prefix for bundler. `GIT_SSH` lets private git gems in the
    /// Gemfile use the app's deploy key.
    fn clean_environment(&self, runner: &Runner) -> Result<String> {
        let wrapper = self.ensure_ssh_wrapper(runner)?;
        Ok(format!(
            "export GIT_SSH={} && export LANG=\"en_US.UTF-8\" && \
             unset RUBYOPT BUNDLE_PATH BUNDLE_FROZEN BUNDLE_WITHOUT BUNDLE_BIN BUNDLE_GEMFILE",
            shell::quote_path_arg(&wrapper)
        ))
    }

    fn ensure_ssh_wrapper(&self, runner: &Runner) -> Result<std::path::PathBuf> {
        let path = self.config.ssh_wrapper_path();
        runner.run(&self.ssh_wrapper_script(&path))?;
        Ok(path)
    }

    pub fn ssh_wrapper_script(&self, path: &Path) -> String {
        let quoted = shell::quote_path_arg(path);
        let dir = path.parent().unwrap_or(path);
        let identity_file = format!("~/.ssh/{}-deploy-key", self.config.app);
        format!(
            "[ -x {path} ] || {{ mkdir -p {dir} && cat > {path} <<'SSH'\n\
#!/bin/sh\n\
unset SSH_AUTH_SOCK\n\
ssh -o 'CheckHostIP no' -o 'StrictHostKeyChecking no' -o 'PasswordAuthentication no' \
-o 'IdentityFile {identity}' -o 'IdentitiesOnly yes' -o 'UserKnownHostsFile /dev/null' \"$@\"\n\
SSH\n\
chmod 0700 {path}; }}",
            path = quoted,
            dir = shell::quote_path_arg(dir),
            identity = identity_file,
        )
    }
}

impl PackageManager for Bundler {
    fn name(&self) -> &'static str {
        "bundler"
    }

    fn setup(&self, runner: &Runner, warnings: &mut Warnings) -> Result<()> {
        self.check_repository(warnings);
        self.setup_sqlite3_if_necessary(runner)?;
        self.check_services_client(warnings)
    }

    fn installed(&self, runner: &Runner) -> bool {
        runner.probe_privileged(&self.installed_check_command())
    }

    fn install(&self, runner: &Runner) -> Result<()> {
        self.clean_bundle_on_system_version_change(runner)?;
        let environment = self.clean_environment(runner)?;
        runner.sudo(&format!(
            "{} && gem install bundler -q --no-document -v {}",
            environment,
            shell::quote_arg(self.bundler_version())
        ))
    }

    fn execute(&self, runner: &Runner) -> Result<()> {
        let environment = self.clean_environment(runner)?;
        runner.run(&format!(
            "{} && cd {} && ruby -S bundle _{}_ install {}",
            environment,
            shell::quote_path_arg(&self.config.release_path()),
            self.bundler_version(),
            self.bundler_options()
        ))?;
        self.write_system_version(runner)
    }
}
