//! Filesystem layout of a deployed app.
//!
//! ```text
//! <deploy_to>/
//!   current -> releases/<id>
//!   releases/<id>/
//!   releases_failed/<id>/
//!   shared/{log,pids,system,config,bundled_gems,cached-copy}
//! ```
//!
//! Release listings read the controller's own filesystem.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use crate::error::{Error, Result};

pub const REVISION_FILE: &str = "REVISION";

impl DeployConfig {
    pub fn deploy_to(&self) -> PathBuf {
        self.deploy_to
            .clone()
            .unwrap_or_else(|| PathBuf::from("/data").join(&self.app))
    }

    pub fn release_dir(&self) -> PathBuf {
        self.deploy_to().join("releases")
    }

    pub fn failed_release_dir(&self) -> PathBuf {
        self.deploy_to().join("releases_failed")
    }

    pub fn shared_path(&self) -> PathBuf {
        self.deploy_to().join("shared")
    }

    pub fn shared_config_path(&self) -> PathBuf {
        self.shared_path().join("config")
    }

    pub fn current_path(&self) -> PathBuf {
        self.deploy_to().join("current")
    }

    pub fn release_path(&self) -> PathBuf {
        self.release_dir().join(&self.release_name)
    }

    pub fn repository_cache(&self) -> PathBuf {
        self.repository_cache
            .clone()
            .unwrap_or_else(|| self.shared_path().join("cached-copy"))
    }

    pub fn maintenance_page_path(&self) -> PathBuf {
        self.shared_path().join("system").join("maintenance.html")
    }

    pub fn services_config_path(&self) -> PathBuf {
        self.shared_config_path().join(&self.services_config_file)
    }

    pub fn bundled_gems_path(&self) -> PathBuf {
        self.shared_path().join("bundled_gems")
    }

    pub fn ruby_version_file(&self) -> PathBuf {
        self.bundled_gems_path().join("RUBY_VERSION")
    }

    pub fn system_version_file(&self) -> PathBuf {
        self.bundled_gems_path().join("SYSTEM_VERSION")
    }

    pub fn binstubs_path(&self) -> PathBuf {
        self.release_path().join("bundler_binstubs")
    }

    pub fn gemfile_path(&self) -> PathBuf {
        self.release_path().join("Gemfile")
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.release_path().join("Gemfile.lock")
    }

    pub fn package_json_path(&self) -> PathBuf {
        self.release_path().join("package.json")
    }

    pub fn ssh_wrapper_path(&self) -> PathBuf {
        self.shared_config_path().join(format!("{}-ssh-wrapper", self.app))
    }

    /// Every release under `releases/`, oldest first.
    pub fn all_releases(&self) -> Result<Vec<PathBuf>> {
        list_releases(&self.release_dir())
    }

    pub fn latest_release(&self) -> Result<Option<PathBuf>> {
        Ok(self.all_releases()?.pop())
    }

    /// The newest release older than `release`.
    pub fn previous_release(&self, release: &Path) -> Result<Option<PathBuf>> {
        let name = release.file_name().map(|n| n.to_os_string());
        Ok(self
            .all_releases()?
            .into_iter()
            .filter(|r| r.file_name().map(|n| n.to_os_string()) < name)
            .last())
    }
}

/// Child directories of `dir`, sorted by name. A missing directory has none.
pub fn list_releases(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::internal_io(
                e.to_string(),
                Some(format!("list releases in {}", dir.display())),
            ))
        }
    };

    let mut releases = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("list releases in {}", dir.display())))
        })?;
        if entry.path().is_dir() {
            releases.push(entry.path());
        }
    }
    releases.sort();
    Ok(releases)
}

pub fn release_name(release: &Path) -> String {
    release
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
