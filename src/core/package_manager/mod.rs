//! Dependency installation for the release being deployed.
//!
//! Managers are listed in [`REGISTRY`] in priority order; the first one whose
//! marker file exists in the release wins. A release with no marker installs
//! nothing.

mod bundler;
mod lockfile;
mod npm;

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::logging::Warnings;
use crate::roles::Runner;
use crate::server::Role;

pub use bundler::Bundler;
pub use lockfile::{Lockfile, DEFAULT_BUNDLER_VERSION};
pub use npm::Npm;

/// Hosts that need the application's dependencies.
pub const BUNDLE_ROLES: &[Role] = &[Role::AppMaster, Role::App, Role::Solo, Role::Util];

pub trait PackageManager {
    fn name(&self) -> &'static str;

    /// Repository checks and prerequisites. Problems that don't block the
    /// install are recorded in `warnings`.
    fn setup(&self, runner: &Runner, warnings: &mut Warnings) -> Result<()>;

    fn installed(&self, runner: &Runner) -> bool;

    fn install(&self, runner: &Runner) -> Result<()>;

    fn execute(&self, runner: &Runner) -> Result<()>;
}

pub struct Registration {
    pub name: &'static str,
    pub required: fn(&Path) -> bool,
    pub build: fn(&DeployConfig) -> Box<dyn PackageManager>,
}

pub static REGISTRY: &[Registration] = &[
    Registration {
        name: "bundler",
        required: bundler::required,
        build: bundler::build,
    },
    Registration {
        name: "npm",
        required: npm::required,
        build: npm::build,
    },
];

/// The manager this release needs, if any.
pub fn resolve(config: &DeployConfig) -> Option<Box<dyn PackageManager>> {
    let release_path = config.release_path();
    REGISTRY
        .iter()
        .find(|r| (r.required)(&release_path))
        .map(|r| (r.build)(config))
}

/// Full install lifecycle on every host that runs app code.
pub fn bundle(manager: &dyn PackageManager, runner: &Runner, warnings: &mut Warnings) -> Result<()> {
    log_status!("deploy", "Installing dependencies with {}", manager.name());
    runner.with_roles(BUNDLE_ROLES, |scoped| {
        manager.setup(scoped, warnings)?;
        if !manager.installed(scoped) {
            manager.install(scoped)?;
        }
        manager.execute(scoped)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    fn config_with_files(files: &[&str]) -> (tempfile::TempDir, DeployConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::new("shop").for_release("20240101000000");
        config.deploy_to = Some(dir.path().to_path_buf());
        fs::create_dir_all(config.release_path()).unwrap();
        for file in files {
            fs::write(config.release_path().join(file), "{}").unwrap();
        }
        (dir, config)
    }

    #[test]
    fn registry_order_is_bundler_then_npm() {
        let names: Vec<_> = REGISTRY.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["bundler", "npm"]);
    }

    #[test]
    fn bundler_wins_when_both_markers_exist() {
        let (_dir, config) = config_with_files(&["Gemfile", "package.json"]);
        assert_eq!(resolve(&config).map(|m| m.name()), Some("bundler"));
    }

    #[test]
    fn npm_resolves_from_package_json() {
        let (_dir, config) = config_with_files(&["package.json"]);
        assert_eq!(resolve(&config).map(|m| m.name()), Some("npm"));
    }

    #[test]
    fn no_marker_means_no_manager() {
        let (_dir, config) = config_with_files(&[]);
        assert!(resolve(&config).is_none());
    }

    struct Recorder {
        installed: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl PackageManager for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn setup(&self, _runner: &Runner, warnings: &mut Warnings) -> Result<()> {
            self.calls.borrow_mut().push("setup");
            warnings.push("recorded");
            Ok(())
        }

        fn installed(&self, _runner: &Runner) -> bool {
            self.calls.borrow_mut().push("installed");
            self.installed
        }

        fn install(&self, _runner: &Runner) -> Result<()> {
            self.calls.borrow_mut().push("install");
            Ok(())
        }

        fn execute(&self, runner: &Runner) -> Result<()> {
            assert_eq!(runner.scope(), &crate::server::RoleSet::only(BUNDLE_ROLES));
            self.calls.borrow_mut().push("execute");
            Ok(())
        }
    }

    #[test]
    fn bundle_installs_only_when_missing() {
        let inventory = crate::server::Inventory::default();
        let wrappers = crate::roles::Wrappers::default();
        let runner = Runner::new(&inventory, &wrappers);
        let mut warnings = Warnings::new();

        let missing = Recorder {
            installed: false,
            calls: RefCell::new(Vec::new()),
        };
        bundle(&missing, &runner, &mut warnings).unwrap();
        assert_eq!(
            *missing.calls.borrow(),
            vec!["setup", "installed", "install", "execute"]
        );

        let present = Recorder {
            installed: true,
            calls: RefCell::new(Vec::new()),
        };
        bundle(&present, &runner, &mut warnings).unwrap();
        assert_eq!(*present.calls.borrow(), vec!["setup", "installed", "execute"]);
        assert_eq!(warnings.len(), 2);
    }
}
