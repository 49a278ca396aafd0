//! Maintenance page on the web-facing hosts.

use std::path::PathBuf;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::roles::Runner;
use crate::server::Role;
use crate::utils::shell;

pub const WEB_ROLES: &[Role] = &[Role::AppMaster, Role::App, Role::Solo];

pub const DEFAULT_PAGE: &str = include_str!("maintenance.html");

const CANDIDATES: &[&str] = &[
    "public/maintenance.html.custom",
    "public/maintenance.html.tmp",
    "public/maintenance.html",
    "public/system/maintenance.html.default",
];

/// Where the page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    File(PathBuf),
    BuiltIn,
}

/// First existing candidate in the release; the built-in page otherwise.
pub fn page_source(config: &DeployConfig) -> PageSource {
    let release = config.release_path();
    config
        .maintenance_page
        .iter()
        .map(String::as_str)
        .chain(CANDIDATES.iter().copied())
        .map(|candidate| release.join(candidate))
        .find(|path| path.is_file())
        .map(PageSource::File)
        .unwrap_or(PageSource::BuiltIn)
}

pub fn enable(runner: &Runner, config: &DeployConfig) -> Result<()> {
    let visible = config.maintenance_page_path();
    let dir = visible.parent().map(PathBuf::from).unwrap_or_else(|| config.shared_path());
    let source = page_source(config);

    let install = match &source {
        PageSource::File(path) => format!(
            "cp {} {}",
            shell::quote_path_arg(path),
            shell::quote_path_arg(&visible)
        ),
        PageSource::BuiltIn => format!(
            "cat > {} <<'STAGEHAND_PAGE'\n{}STAGEHAND_PAGE",
            shell::quote_path_arg(&visible),
            DEFAULT_PAGE
        ),
    };

    log_status!("deploy", "Enabling maintenance page.");
    runner.with_roles(WEB_ROLES, |scoped| {
        scoped.run(&format!("mkdir -p {} && {}", shell::quote_path_arg(&dir), install))
    })
}

pub fn disable(runner: &Runner, config: &DeployConfig) -> Result<()> {
    log_status!("deploy", "Removing maintenance page.");
    runner.with_roles(WEB_ROLES, |scoped| {
        scoped.run(&format!(
            "rm -f {}",
            shell::quote_path_arg(&config.maintenance_page_path())
        ))
    })
}
