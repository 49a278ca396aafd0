//! Per-app task overrides shipped in the repository.
//!
//! An app may commit `config/stagehand.json` (or `stagehand.json` at the root)
//! to replace selected commands and settings. Only the keys below are
//! accepted; anything else is a config error rather than silently ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::utils::io;

pub const OVERRIDE_FILES: &[&str] = &["config/stagehand.json", "stagehand.json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_releases: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_page: Option<String>,
}

impl DeployOverrides {
    /// First override file found in `root`, if any.
    pub fn load(root: &Path) -> Result<Option<(PathBuf, Self)>> {
        for candidate in OVERRIDE_FILES {
            let path = root.join(candidate);
            let Some(content) = io::read_file_optional(&path, "read deploy overrides")? else {
                continue;
            };
            let overrides: DeployOverrides = serde_json::from_str(&content)
                .map_err(|e| Error::config_invalid_json(path.to_string_lossy(), e))?;
            return Ok(Some((path, overrides)));
        }
        Ok(None)
    }

    pub fn apply(&self, config: &mut DeployConfig) -> Result<()> {
        if let Some(keep) = self.keep_releases {
            if keep == 0 {
                return Err(Error::config_invalid_value(
                    "keep_releases",
                    Some("0".to_string()),
                    "must keep at least one release",
                ));
            }
            config.keep_releases = keep;
        }
        if let Some(command) = &self.restart_command {
            config.restart_command = Some(command.clone());
        }
        if let Some(command) = &self.migration_command {
            config.migration_command = command.clone();
        }
        if let Some(command) = &self.asset_command {
            config.asset_command = command.clone();
        }
        if let Some(page) = &self.maintenance_page {
            config.maintenance_page = Some(page.clone());
        }
        Ok(())
    }
}

/// Merge overrides from the repository cache into `config`, if present.
pub fn apply_from_cache(config: &mut DeployConfig) -> Result<()> {
    if let Some((path, overrides)) = DeployOverrides::load(&config.repository_cache())? {
        log_status!("deploy", "Loading deploy overrides from {}", path.display());
        overrides.apply(config)?;
    }
    Ok(())
}
