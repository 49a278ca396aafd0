//! Shared resources linked into every release.

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::roles::Runner;
use crate::utils::shell;

pub const SHARED_DIRS: &[&str] = &["log", "pids", "system", "config"];

pub fn create_shared_dirs(runner: &Runner, config: &DeployConfig) -> Result<()> {
    let shared = config.shared_path();
    let dirs: Vec<String> = SHARED_DIRS
        .iter()
        .map(|dir| shell::quote_path_arg(&shared.join(dir)))
        .collect();
    runner.run(&format!("mkdir -p {}", dirs.join(" ")))
}

/// Fixed link tasks for `release`, in order.
pub fn symlink_tasks(config: &DeployConfig, release: &Path) -> Vec<String> {
    let q = shell::quote_path_arg;
    let shared = config.shared_path();
    let shared_config = config.shared_config_path();
    let database_yml = shared_config.join("database.yml");

    vec![
        format!("chmod -R g+w {}", q(release)),
        format!(
            "rm -rf {} {} {}",
            q(&release.join("log")),
            q(&release.join("public/system")),
            q(&release.join("tmp/pids"))
        ),
        format!("mkdir -p {}", q(&release.join("tmp"))),
        format!("ln -nfs {} {}", q(&shared.join("log")), q(&release.join("log"))),
        format!(
            "mkdir -p {} {}",
            q(&release.join("public")),
            q(&release.join("config"))
        ),
        format!(
            "ln -nfs {} {}",
            q(&shared.join("system")),
            q(&release.join("public/system"))
        ),
        format!(
            "ln -nfs {} {}",
            q(&shared.join("pids")),
            q(&release.join("tmp/pids"))
        ),
        format!(
            "find {} -maxdepth 1 -type f -not -name 'database.yml' -exec ln -nfs {{}} {} \\;",
            q(&shared_config),
            q(&release.join("config"))
        ),
        format!(
            "if [ -f {db} ]; then ln -nfs {db} {target}; fi",
            db = q(&database_yml),
            target = q(&release.join("config/database.yml"))
        ),
    ]
}

/// Create the shared tree, link it into the release and hand the release to
/// the deploy user.
pub fn symlink_configs(runner: &Runner, config: &DeployConfig, release: &Path) -> Result<()> {
    log_status!("deploy", "Preparing shared resources for release.");
    create_shared_dirs(runner, config)?;

    log_status!("deploy", "Symlinking configs.");
    runner.run(&symlink_tasks(config, release).join(" && "))?;

    runner.sudo(&format!(
        "chown -R {} {}",
        shell::quote_arg(&format!("{}:{}", config.user, config.group)),
        shell::quote_path_arg(release)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Wrappers;
    use crate::server::{Inventory, Role};
    use crate::ssh::SshClient;
    use std::fs;
    use std::sync::Arc;

    fn fixture() -> (tempfile::TempDir, DeployConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::new("shop").for_release("20240101000000");
        config.deploy_to = Some(dir.path().to_path_buf());
        config.user = crate::utils::command::run("id", &["-un"], "user").unwrap();
        config.group = crate::utils::command::run("id", &["-gn"], "group").unwrap();
        (dir, config)
    }

    fn link_release(config: &DeployConfig) {
        let inventory = Inventory::new(vec![Arc::new(SshClient::local(None, vec![Role::Solo]))]);
        let wrappers = Wrappers {
            shell: vec!["sh".to_string(), "-c".to_string()],
            privileged: vec!["sh".to_string(), "-c".to_string()],
        };
        let runner = Runner::new(&inventory, &wrappers);
        symlink_configs(&runner, config, &config.release_path()).unwrap();
    }

    #[test]
    fn task_order_is_fixed() {
        let (_dir, config) = fixture();
        let tasks = symlink_tasks(&config, &config.release_path());
        assert_eq!(tasks.len(), 9);
        assert!(tasks[0].starts_with("chmod -R g+w"));
        assert!(tasks[1].starts_with("rm -rf"));
        assert!(tasks[7].contains("-not -name 'database.yml'"));
        assert!(tasks[8].contains("database.yml"));
    }

    #[test]
    fn shared_resources_are_linked_into_release() {
        let (_dir, config) = fixture();
        let release = config.release_path();
        fs::create_dir_all(release.join("log")).unwrap();
        fs::write(release.join("log/tracked.log"), "old").unwrap();
        fs::create_dir_all(config.shared_config_path()).unwrap();
        fs::write(config.shared_config_path().join("database.yml"), "db").unwrap();
        fs::write(config.shared_config_path().join("secrets.yml"), "s").unwrap();

        link_release(&config);

        let shared = config.shared_path();
        for dir in SHARED_DIRS {
            assert!(shared.join(dir).is_dir(), "{} missing", dir);
        }
        assert_eq!(fs::read_link(release.join("log")).unwrap(), shared.join("log"));
        assert_eq!(
            fs::read_link(release.join("public/system")).unwrap(),
            shared.join("system")
        );
        assert_eq!(fs::read_link(release.join("tmp/pids")).unwrap(), shared.join("pids"));
        assert_eq!(
            fs::read_link(release.join("config/secrets.yml")).unwrap(),
            config.shared_config_path().join("secrets.yml")
        );
        assert_eq!(
            fs::read_link(release.join("config/database.yml")).unwrap(),
            config.shared_config_path().join("database.yml")
        );
    }

    #[test]
    fn missing_database_yml_is_not_linked() {
        let (_dir, config) = fixture();
        fs::create_dir_all(config.release_path()).unwrap();

        link_release(&config);

        assert!(fs::symlink_metadata(config.release_path().join("config/database.yml")).is_err());
        assert!(config.release_path().join("config").is_dir());
    }
}
