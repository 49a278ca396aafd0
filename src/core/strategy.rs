//! How the repository cache on the controller gets its code.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{DeployConfig, StrategyKind};
use crate::error::{Error, Result};
use crate::paths::REVISION_FILE;
use crate::utils::{command, io};

pub trait Strategy {
    /// Bring the repository cache to the revision being deployed.
    fn update_repository_cache(&self) -> Result<()>;

    /// Revision currently in the repository cache.
    fn revision(&self) -> Result<String>;

    /// One-line description of `revision` for the deploy log.
    fn short_log_message(&self, revision: &str) -> String;
}

pub fn for_config(config: &DeployConfig) -> Box<dyn Strategy> {
    match config.strategy {
        StrategyKind::Git => Box::new(Git {
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            cache: config.repository_cache(),
        }),
        StrategyKind::Prepared => Box::new(Prepared {
            cache: config.repository_cache(),
        }),
    }
}

pub struct Git {
    pub repo: Option<String>,
    pub branch: String,
    pub cache: PathBuf,
}

impl Git {
    fn git(&self, args: &[&str], context: &str) -> Result<String> {
        command::run_in(&self.cache, "git", args, context)
    }

    fn clone_cache(&self) -> Result<()> {
        let repo = self.repo.as_deref().ok_or_else(|| {
            Error::config_missing_key("repo", None)
                .with_hint("Set \"repo\" or use the \"prepared\" strategy")
        })?;

        if let Some(parent) = self.cache.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
            })?;
        }

        log_status!("deploy", "Cloning {} into {}", repo, self.cache.display());
        command::run(
            "git",
            &["clone", "--quiet", repo, &self.cache.to_string_lossy()],
            "git clone",
        )?;
        Ok(())
    }

    /// A remote branch if one exists by that name, otherwise the name as given
    /// (tag or commit).
    fn resolve_ref(&self) -> String {
        let remote = format!("origin/{}", self.branch);
        match command::run_in_optional(&self.cache, "git", &["rev-parse", "--verify", "--quiet", &remote]) {
            Some(_) => remote,
            None => self.branch.clone(),
        }
    }
}

impl Strategy for Git {
    fn update_repository_cache(&self) -> Result<()> {
        if self.cache.join(".git").is_dir() {
            log_status!("deploy", "Fetching into {}", self.cache.display());
            self.git(&["fetch", "--quiet", "--prune", "--tags", "origin"], "git fetch")?;
        } else {
            self.clone_cache()?;
        }

        let target = self.resolve_ref();
        self.git(&["checkout", "--quiet", "--force", &target], "git checkout")?;
        self.git(&["clean", "-dfq"], "git clean")?;
        Ok(())
    }

    fn revision(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"], "git rev-parse")
    }

    fn short_log_message(&self, revision: &str) -> String {
        command::run_in_optional(
            &self.cache,
            "git",
            &["log", "--pretty=oneline", "--abbrev-commit", "-n", "1", revision],
        )
        .unwrap_or_else(|| revision.to_string())
    }
}

/// Trusts whatever already sits in the cache.
pub struct Prepared {
    pub cache: PathBuf,
}

impl Strategy for Prepared {
    fn update_repository_cache(&self) -> Result<()> {
        if !self.cache.is_dir() {
            return Err(Error::config_invalid_value(
                "repository_cache",
                Some(self.cache.to_string_lossy().into_owned()),
                "prepared strategy needs an existing repository cache",
            ));
        }
        Ok(())
    }

    fn revision(&self) -> Result<String> {
        read_revision(&self.cache)
    }

    fn short_log_message(&self, revision: &str) -> String {
        revision.to_string()
    }
}

/// Contents of `<dir>/REVISION`, or `unknown`.
pub fn read_revision(dir: &Path) -> Result<String> {
    let content = io::read_file_optional(&dir.join(REVISION_FILE), "read REVISION")?;
    Ok(content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "unknown".to_string()))
}
