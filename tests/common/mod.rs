#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use stagehand::config::{DeployConfig, StrategyKind};
use stagehand::deploy::{Deploy, DeployReport, DeployResult};
use stagehand::process::CommandResult;
use stagehand::roles::{Runner, Wrappers};
use stagehand::server::{Inventory, RemoteTarget, Role};
use stagehand::ssh::SshClient;
use stagehand::Result;

/// A deploy root plus a prepared repository cache, all in a temp dir.
pub struct Site {
    pub dir: tempfile::TempDir,
    pub config: DeployConfig,
}

impl Site {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = DeployConfig::new("shop");
        config.deploy_to = Some(dir.path().join("shop"));
        config.strategy = StrategyKind::Prepared;
        config.user = current("-un");
        config.group = current("-gn");
        config.restart_command = Some("true".to_string());
        config.services_check_command = "false".to_string();

        let site = Self { dir, config };
        site.write_cache("app.rb", "puts :v1\n");
        site.write_cache("REVISION", "abc123\n");
        site.write_cache(".git/HEAD", "ref: refs/heads/master\n");
        site
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_cache(&self, relative: &str, content: &str) {
        let path = self.config.repository_cache().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write cache file");
    }

    pub fn write_shared_config(&self, name: &str, content: &str) {
        let dir = self.config.shared_config_path();
        fs::create_dir_all(&dir).expect("mkdir shared config");
        fs::write(dir.join(name), content).expect("write shared config");
    }

    pub fn release(&self, name: &str) -> DeployConfig {
        self.config.for_release(name)
    }

    pub fn release_path(&self, name: &str) -> PathBuf {
        self.config.release_dir().join(name)
    }

    pub fn current_target(&self) -> Option<PathBuf> {
        fs::read_link(self.config.current_path()).ok()
    }

    pub fn release_names(&self) -> Vec<String> {
        names_in(&self.config.release_dir())
    }

    pub fn failed_release_names(&self) -> Vec<String> {
        names_in(&self.config.failed_release_dir())
    }

    /// Run a cached deploy of release `name` against `inventory`.
    pub fn deploy(&self, name: &str, inventory: &Inventory) -> DeployResult<DeployReport> {
        self.deploy_config(self.release(name), inventory)
    }

    pub fn deploy_config(
        &self,
        config: DeployConfig,
        inventory: &Inventory,
    ) -> DeployResult<DeployReport> {
        let wrappers = plain_wrappers();
        let runner = Runner::new(inventory, &wrappers);
        Deploy::new(config, runner).cached_deploy()
    }
}

fn names_in(dir: &Path) -> Vec<String> {
    stagehand::paths::list_releases(dir)
        .expect("list releases")
        .iter()
        .map(|p| stagehand::paths::release_name(p))
        .collect()
}

fn current(flag: &str) -> String {
    stagehand::utils::command::run("id", &[flag], "id").expect("id")
}

/// Wrappers without login shells or sudo, for running as the test user.
pub fn plain_wrappers() -> Wrappers {
    Wrappers {
        shell: vec!["sh".to_string(), "-c".to_string()],
        privileged: vec!["sh".to_string(), "-c".to_string()],
    }
}

pub fn solo_inventory() -> Inventory {
    Inventory::new(vec![Arc::new(SshClient::local(None, vec![Role::Solo]))])
}

/// Runs commands locally, but fails any command containing `needle`.
pub struct FailingTarget {
    inner: SshClient,
    needle: String,
}

impl FailingTarget {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            inner: SshClient::local(None, vec![Role::Solo]),
            needle: needle.into(),
        }
    }

    pub fn inventory(needle: impl Into<String>) -> Inventory {
        Inventory::new(vec![Arc::new(Self::new(needle))])
    }
}

impl RemoteTarget for FailingTarget {
    fn hostname(&self) -> &str {
        self.inner.hostname()
    }

    fn roles(&self) -> &[Role] {
        self.inner.roles()
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn run(&self, command: &str) -> Result<CommandResult> {
        if command.contains(&self.needle) {
            return Ok(CommandResult::new(command, 1, "injected failure\n"));
        }
        self.inner.run(command)
    }

    fn sync_directory(&self, path: &Path) -> Result<CommandResult> {
        self.inner.sync_directory(path)
    }
}

/// Records what it is asked to do and never touches the filesystem.
pub struct RecordingTarget {
    host: String,
    roles: Vec<Role>,
    fail_sync: bool,
    pub commands: Mutex<Vec<String>>,
}

impl RecordingTarget {
    pub fn new(host: &str, roles: Vec<Role>, fail_sync: bool) -> Self {
        Self {
            host: host.to_string(),
            roles,
            fail_sync,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.commands.lock().expect("lock").clone()
    }
}

impl RemoteTarget for RecordingTarget {
    fn hostname(&self) -> &str {
        &self.host
    }

    fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn run(&self, command: &str) -> Result<CommandResult> {
        self.commands.lock().expect("lock").push(command.to_string());
        Ok(CommandResult::new(command, 0, ""))
    }

    fn sync_directory(&self, path: &Path) -> Result<CommandResult> {
        let command = format!(
            "rsync -aq --delete {}/ {}:{}",
            path.display(),
            self.host,
            path.display()
        );
        self.commands.lock().expect("lock").push(command.clone());
        if self.fail_sync {
            Ok(CommandResult::new(command, 12, "rsync: connection unexpectedly closed\n"))
        } else {
            Ok(CommandResult::new(command, 0, ""))
        }
    }
}
