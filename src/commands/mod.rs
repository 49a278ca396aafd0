use clap::Args;
use std::path::PathBuf;

use stagehand::config::DeployConfig;
use stagehand::deploy::DeployFailure;
use stagehand::roles::Wrappers;
use stagehand::server::Inventory;

pub type CmdResult<T> = stagehand::Result<(T, i32)>;

pub struct GlobalArgs {
    pub verbose: bool,
}

/// Where the deploy config comes from.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Deploy config file (JSON)
    #[arg(long = "config", short = 'c', value_name = "PATH")]
    pub config: PathBuf,

    /// Release name to use instead of the generated timestamp
    #[arg(long)]
    pub release_name: Option<String>,
}

impl ConfigArgs {
    /// Load the config and start logging at the level it asks for.
    pub fn load(&self, global: &GlobalArgs) -> stagehand::Result<DeployConfig> {
        let mut config = DeployConfig::load(&self.config)?;
        if let Some(name) = &self.release_name {
            config = config.for_release(name.clone());
            config.validate(&self.config.to_string_lossy())?;
        }
        config.verbose |= global.verbose;
        stagehand::logging::init(config.verbose);
        Ok(config)
    }
}

/// Hosts and command wrappers a pipeline runs against.
pub struct Fleet {
    pub inventory: Inventory,
    pub wrappers: Wrappers,
}

impl Fleet {
    pub fn from_config(config: &DeployConfig) -> stagehand::Result<Self> {
        Ok(Self {
            inventory: Inventory::from_servers(&config.servers)?,
            wrappers: Wrappers::from_config(config),
        })
    }
}

/// Flatten a failed attempt into the error envelope, report included.
pub fn failure_to_error(failure: DeployFailure) -> stagehand::Error {
    let DeployFailure { mut error, report } = failure;
    let Ok(report) = serde_json::to_value(&report) else {
        return error;
    };

    match error.details.as_object_mut() {
        Some(details) => {
            details.insert("report".to_string(), report);
        }
        None => {
            let mut details = serde_json::Map::new();
            if !error.details.is_null() {
                details.insert("detail".to_string(), error.details.take());
            }
            details.insert("report".to_string(), report);
            error.details = serde_json::Value::Object(details);
        }
    }
    error
}

pub mod deploy;
pub mod hook;
pub mod restart;
pub mod rollback;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (stagehand::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Rollback(args) => dispatch!(args, global, rollback),
        crate::Commands::Restart(args) => dispatch!(args, global, restart),

        // Exit status mirrors the hook's, failure or not
        crate::Commands::Hook(args) => hook::run_json(args, global),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand::deploy::DeployReport;

    #[test]
    fn failure_envelope_carries_report() {
        let failure = DeployFailure {
            error: stagehand::Error::internal_unexpected("boom"),
            report: DeployReport::new("20240101000000"),
        };
        let error = failure_to_error(failure);
        assert_eq!(error.details["error"], "boom");
        assert_eq!(error.details["report"]["release"], "20240101000000");
    }

    #[test]
    fn report_survives_non_object_details() {
        let failure = DeployFailure {
            error: stagehand::Error::new(
                stagehand::ErrorCode::InternalUnexpected,
                "boom",
                serde_json::Value::String("raw detail".to_string()),
            ),
            report: DeployReport::new("20240101000000"),
        };
        let error = failure_to_error(failure);
        assert_eq!(error.details["detail"], "raw detail");
        assert_eq!(error.details["report"]["release"], "20240101000000");

        let failure = DeployFailure {
            error: stagehand::Error::new(
                stagehand::ErrorCode::InternalUnexpected,
                "boom",
                serde_json::Value::Null,
            ),
            report: DeployReport::new("20240101000000"),
        };
        let error = failure_to_error(failure);
        assert!(error.details.get("detail").is_none());
        assert_eq!(error.details["report"]["release"], "20240101000000");
    }

    #[test]
    fn load_applies_release_name_and_verbosity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(&path, r#"{"app": "shop"}"#).unwrap();

        let args = ConfigArgs {
            config: path,
            release_name: Some("20240101000000".to_string()),
        };
        let config = args.load(&GlobalArgs { verbose: true }).unwrap();
        assert_eq!(config.release_name, "20240101000000");
        assert!(config.verbose);
    }

    #[test]
    fn release_name_must_be_a_path_component() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(&path, r#"{"app": "shop"}"#).unwrap();

        let args = ConfigArgs {
            config: path,
            release_name: Some("../escape".to_string()),
        };
        assert!(args.load(&GlobalArgs { verbose: false }).is_err());
    }
}
