//! Deploy hooks.
//!
//! Hooks are executables shipped with the app under `<release>/deploy/`.
//! The controller never runs them itself: it asks every host in scope to run
//! `<bin> hook <name> ...`, and that subcommand finds and runs the file on the
//! host with the deploy context in its environment.
//!
//! Lookup order for hook `before_symlink`:
//! 1. `deploy/before_symlink.sh`, run with `sh`
//! 2. `deploy/before_symlink`, run directly if executable
//!
//! No file means nothing to do. The controller checks its own copy of the
//! release (or the repository cache) first and skips hosts entirely when the
//! app ships no such hook.

use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::process::{CommandResult, Spawn, TracingSink};
use crate::roles::Runner;
use crate::utils::shell;

pub const HOOK_DIR: &str = "deploy";

/// Build the command every host runs for hook `name`, minus per-host flags.
pub fn hook_command(config: &DeployConfig, name: &str) -> Result<String> {
    let bin = match &config.serverside_bin {
        Some(bin) => bin.clone(),
        None => std::env::current_exe()
            .map_err(|e| Error::internal_io(e.to_string(), Some("locate stagehand binary".into())))?
            .to_string_lossy()
            .into_owned(),
    };

    let release_path = config.release_path().to_string_lossy().into_owned();
    Ok(shell::quote_args(&[
        bin.as_str(),
        "hook",
        name,
        "--app",
        config.app.as_str(),
        "--release-path",
        release_path.as_str(),
        "--framework-env",
        config.framework_env.as_str(),
    ]))
}

/// True when the app ships hook `name`, judged from the controller's tree.
pub fn hook_available(config: &DeployConfig, name: &str) -> bool {
    find_hook(&config.release_path(), name).is_some()
        || find_hook(&config.repository_cache(), name).is_some()
}

/// Run hook `name` on every host in the runner's scope.
pub fn run_hook(runner: &Runner, config: &DeployConfig, name: &str) -> Result<()> {
    if !hook_available(config, name) {
        tracing::debug!("No {} hook shipped, skipping", name);
        return Ok(());
    }

    log_status!("deploy", "Running {} hook", name);
    let base = hook_command(config, name)?;
    let config_json = config.to_json()?;

    runner.run_with(&base, |target, base| {
        let mut command = format!(
            "{} --current-roles {} --config {}",
            base,
            shell::quote_arg(&target.roles_label()),
            shell::quote_arg(&config_json)
        );
        if let Some(name) = target.name() {
            command.push_str(" --current-name ");
            command.push_str(&shell::quote_arg(name));
        }
        command
    })
}

/// Everything a hook gets to know about the deploy it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    pub name: String,
    pub app: String,
    pub release_path: PathBuf,
    pub framework_env: String,
    pub current_roles: String,
    pub current_name: Option<String>,
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookScript {
    Shell(PathBuf),
    Executable(PathBuf),
}

impl HookScript {
    fn command_line(&self) -> String {
        match self {
            HookScript::Shell(path) => format!("sh {}", shell::quote_path_arg(path)),
            HookScript::Executable(path) => shell::quote_path_arg(path),
        }
    }
}

pub fn find_hook(release_path: &Path, name: &str) -> Option<HookScript> {
    let dir = release_path.join(HOOK_DIR);

    let script = dir.join(format!("{}.sh", name));
    if script.is_file() {
        return Some(HookScript::Shell(script));
    }

    let executable = dir.join(name);
    if executable.is_file() && is_executable(&executable) {
        return Some(HookScript::Executable(executable));
    }

    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Run the hook described by `context` on this host.
///
/// Returns `None` when the release has no such hook.
pub fn execute(context: &HookContext) -> Result<Option<CommandResult>> {
    if context.name.is_empty() || context.name.contains('/') || context.name.starts_with('.') {
        return Err(Error::validation_invalid_argument(
            "name",
            format!("'{}' is not a valid hook name", context.name),
        ));
    }

    let Some(script) = find_hook(&context.release_path, &context.name) else {
        tracing::debug!("No {} hook in {}", context.name, context.release_path.display());
        return Ok(None);
    };

    log_status!("hook", "Executing {}", context.name);

    let mut spawn = Spawn::new(script.command_line())
        .current_dir(&context.release_path)
        .env("STAGEHAND_APP", &context.app)
        .env("STAGEHAND_RELEASE_PATH", context.release_path.to_string_lossy())
        .env("STAGEHAND_FRAMEWORK_ENV", &context.framework_env)
        .env("STAGEHAND_CURRENT_ROLES", &context.current_roles)
        .env(
            "STAGEHAND_CURRENT_NAME",
            context.current_name.clone().unwrap_or_default(),
        )
        .env("STAGEHAND_CONFIG", context.config.clone().unwrap_or_default());

    let framework = DeployConfig {
        framework_env: context.framework_env.clone(),
        ..DeployConfig::new(context.app.clone())
    };
    for (key, value) in framework.framework_env_pairs() {
        spawn = spawn.env(key, value);
    }

    spawn.run(&mut TracingSink).map(Some)
}
