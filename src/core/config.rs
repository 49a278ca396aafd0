//! Deploy configuration.
//!
//! One JSON document describes the app, its hosts and every tunable of the
//! release pipeline. Missing optional keys fall back to the `default_*`
//! functions below. The same document is handed to hooks via `--config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::server::Server;
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Clone/fetch the repository into the cache on the controller.
    #[default]
    Git,
    /// The cache is filled by something else before the deploy runs.
    Prepared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub app: String,

    #[serde(default = "default_framework_env")]
    pub framework_env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,

    #[serde(default = "default_stack")]
    pub stack: String,

    #[serde(default)]
    pub migrate: bool,

    #[serde(default = "default_migration_command")]
    pub migration_command: String,

    #[serde(default)]
    pub precompile_assets: bool,

    #[serde(default = "default_asset_command")]
    pub asset_command: String,

    /// Defaults to `/data/<app>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_to: Option<PathBuf>,

    #[serde(default = "default_release_name")]
    pub release_name: String,

    /// Defaults to `<shared>/cached-copy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_cache: Option<PathBuf>,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_user")]
    pub group: String,

    #[serde(default)]
    pub copy_exclude: Vec<String>,

    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_command: Option<String>,

    #[serde(default = "default_services_check_command")]
    pub services_check_command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services_setup_command: Option<String>,

    #[serde(default = "default_services_config_file")]
    pub services_config_file: String,

    #[serde(default = "default_services_client")]
    pub services_client: String,

    #[serde(default = "default_bundle_without")]
    pub bundle_without: String,

    #[serde(default = "default_ruby_version_command")]
    pub ruby_version_command: String,

    #[serde(default = "default_system_version_command")]
    pub system_version_command: String,

    #[serde(default = "default_shell_wrapper")]
    pub shell_wrapper: Vec<String>,

    #[serde(default = "default_privileged_wrapper")]
    pub privileged_wrapper: Vec<String>,

    #[serde(default = "default_required_downtime_stacks")]
    pub required_downtime_stacks: Vec<String>,

    /// Program used to run hooks on each host. Defaults to this executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serverside_bin: Option<String>,

    /// Custom maintenance page, relative to the release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_page: Option<String>,

    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default)]
    pub verbose: bool,
}

fn default_framework_env() -> String {
    "production".to_string()
}

fn default_stack() -> String {
    "nginx_unicorn".to_string()
}

fn default_migration_command() -> String {
    "rake db:migrate --trace".to_string()
}

fn default_asset_command() -> String {
    "rake assets:precompile".to_string()
}

pub fn default_release_name() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_user() -> String {
    "deploy".to_string()
}

fn default_keep_releases() -> usize {
    3
}

fn default_services_check_command() -> String {
    "which stagehand-services-setup".to_string()
}

fn default_services_config_file() -> String {
    "services_config_deploy.yml".to_string()
}

fn default_services_client() -> String {
    "ey_config".to_string()
}

fn default_bundle_without() -> String {
    "test development".to_string()
}

fn default_ruby_version_command() -> String {
    "ruby -v".to_string()
}

fn default_system_version_command() -> String {
    "uname -m".to_string()
}

fn default_shell_wrapper() -> Vec<String> {
    ["sh", "-l", "-c"].map(String::from).to_vec()
}

fn default_privileged_wrapper() -> Vec<String> {
    ["sudo", "sh", "-l", "-c"].map(String::from).to_vec()
}

fn default_required_downtime_stacks() -> Vec<String> {
    ["nginx_mongrel", "glassfish"].map(String::from).to_vec()
}

impl DeployConfig {
    /// Minimal config for `app`; every other key at its default.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            framework_env: default_framework_env(),
            environment_name: None,
            stack: default_stack(),
            migrate: false,
            migration_command: default_migration_command(),
            precompile_assets: false,
            asset_command: default_asset_command(),
            deploy_to: None,
            release_name: default_release_name(),
            repository_cache: None,
            strategy: StrategyKind::default(),
            repo: None,
            branch: default_branch(),
            user: default_user(),
            group: default_user(),
            copy_exclude: Vec::new(),
            keep_releases: default_keep_releases(),
            restart_command: None,
            services_check_command: default_services_check_command(),
            services_setup_command: None,
            services_config_file: default_services_config_file(),
            services_client: default_services_client(),
            bundle_without: default_bundle_without(),
            ruby_version_command: default_ruby_version_command(),
            system_version_command: default_system_version_command(),
            shell_wrapper: default_shell_wrapper(),
            privileged_wrapper: default_privileged_wrapper(),
            required_downtime_stacks: default_required_downtime_stacks(),
            serverside_bin: None,
            maintenance_page: None,
            servers: Vec::new(),
            verbose: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = io::read_file(path, "read deploy config")?;
        Self::from_json(&content, &path.to_string_lossy())
    }

    /// Parse and validate. `source` names the origin in error details.
    pub fn from_json(json: &str, source: &str) -> Result<Self> {
        let config: DeployConfig =
            serde_json::from_str(json).map_err(|e| Error::config_invalid_json(source, e))?;
        config.validate(source)?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize deploy config".into())))
    }

    pub fn validate(&self, source: &str) -> Result<()> {
        if self.app.trim().is_empty() {
            return Err(Error::config_missing_key("app", Some(source.to_string()))
                .with_hint("Set \"app\" to the application name"));
        }
        if self.keep_releases == 0 {
            return Err(Error::config_invalid_value(
                "keep_releases",
                Some("0".to_string()),
                "must keep at least one release",
            ));
        }
        if self.shell_wrapper.is_empty() || self.privileged_wrapper.is_empty() {
            return Err(Error::config_invalid_value(
                "shell_wrapper",
                None,
                "command wrappers cannot be empty",
            ));
        }
        if !is_release_name(&self.release_name) {
            return Err(Error::config_invalid_value(
                "release_name",
                Some(self.release_name.clone()),
                "must be a single non-empty path component",
            ));
        }
        for server in &self.servers {
            if !server.is_valid() {
                return Err(Error::config_invalid_value(
                    "servers",
                    Some(server.hostname.clone()),
                    "every server needs a hostname and at least one role",
                ));
            }
        }
        Ok(())
    }

    /// Copy of this config aimed at another release.
    pub fn for_release(&self, release_name: impl Into<String>) -> Self {
        Self {
            release_name: release_name.into(),
            ..self.clone()
        }
    }

    pub fn restart_command(&self) -> String {
        self.restart_command.clone().unwrap_or_else(|| {
            format!("LANG=\"en_US.UTF-8\" /usr/local/bin/app_{} deploy", self.app)
        })
    }

    pub fn services_setup_command(&self) -> String {
        self.services_setup_command
            .clone()
            .unwrap_or_else(|| format!("stagehand-services-setup {}", self.app))
    }

    pub fn requires_maintenance_page(&self) -> bool {
        self.migrate || self.required_downtime_stacks.contains(&self.stack)
    }

    /// Environment variables every framework command runs with.
    pub fn framework_env_pairs(&self) -> Vec<(&'static str, String)> {
        ["RAILS_ENV", "RACK_ENV", "NODE_ENV", "MERB_ENV"]
            .into_iter()
            .map(|key| (key, self.framework_env.clone()))
            .collect()
    }

    /// Names of the external services currently configured on this machine.
    ///
    /// Read from the shared services file; a missing file, invalid YAML or a
    /// document that is not a mapping all mean no services.
    pub fn configured_services(&self) -> Result<Vec<String>> {
        let path = self.services_config_path();
        let content = io::read_file_optional(&path, "read services config")?;
        Ok(content.map(|c| parse_configured_services(&c)).unwrap_or_default())
    }

    /// `RAILS_ENV=production RACK_ENV=production ...` for command prefixes.
    pub fn framework_envs(&self) -> String {
        self.framework_env_pairs()
            .iter()
            .map(|(key, value)| format!("{}={}", key, crate::utils::shell::quote_arg(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn parse_configured_services(content: &str) -> Vec<String> {
    match serde_yml::from_str::<serde_yml::Value>(content) {
        Ok(serde_yml::Value::Mapping(services)) => services
            .keys()
            .map(|k| match k {
                serde_yml::Value::String(s) => s.clone(),
                other => serde_yml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_release_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = DeployConfig::from_json(r#"{"app":"shop"}"#, "inline").unwrap();
        assert_eq!(config.framework_env, "production");
        assert_eq!(config.keep_releases, 3);
        assert_eq!(config.branch, "master");
        assert_eq!(config.strategy, StrategyKind::Git);
        assert_eq!(config.shell_wrapper, vec!["sh", "-l", "-c"]);
        assert_eq!(config.required_downtime_stacks, vec!["nginx_mongrel", "glassfish"]);
        assert_eq!(config.release_name.len(), 14);
        assert!(config.release_name.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn missing_app_is_reported() {
        let err = DeployConfig::from_json(r#"{"app":""}"#, "deploy.json").unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = DeployConfig::from_json("{", "deploy.json").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn zero_retention_is_rejected() {
        let err = DeployConfig::from_json(r#"{"app":"shop","keep_releases":0}"#, "x").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn release_name_must_be_one_component() {
        let err =
            DeployConfig::from_json(r#"{"app":"shop","release_name":"../x"}"#, "x").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn serialization_round_trips() {
        let mut config = DeployConfig::new("shop");
        config.migrate = true;
        config.copy_exclude = vec!["spec".to_string()];
        config.deploy_to = Some(PathBuf::from("/srv/shop"));
        let json = config.to_json().unwrap();
        let back = DeployConfig::from_json(&json, "roundtrip").unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn maintenance_required_for_migrations_or_downtime_stacks() {
        let mut config = DeployConfig::new("shop");
        assert!(!config.requires_maintenance_page());
        config.stack = "glassfish".to_string();
        assert!(config.requires_maintenance_page());
        config.stack = "nginx_unicorn".to_string();
        config.migrate = true;
        assert!(config.requires_maintenance_page());
    }

    #[test]
    fn derived_commands_use_app_name() {
        let config = DeployConfig::new("shop");
        assert_eq!(
            config.restart_command(),
            "LANG=\"en_US.UTF-8\" /usr/local/bin/app_shop deploy"
        );
        assert_eq!(config.services_setup_command(), "stagehand-services-setup shop");
        assert_eq!(
            config.framework_envs(),
            "RAILS_ENV=production RACK_ENV=production NODE_ENV=production MERB_ENV=production"
        );
    }

    #[test]
    fn configured_services_are_mapping_keys() {
        let services = parse_configured_services("servicio:\n  foo: bar\nmailer:\n  key: x\n");
        assert_eq!(services, vec!["servicio", "mailer"]);
    }

    #[test]
    fn non_mapping_services_count_as_empty() {
        assert!(parse_configured_services("42").is_empty());
        assert!(parse_configured_services("- a\n- b\n").is_empty());
        assert!(parse_configured_services("servicio: [unclosed").is_empty());
        assert!(parse_configured_services("").is_empty());
    }

    #[test]
    fn services_read_from_shared_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::new("shop");
        config.deploy_to = Some(dir.path().to_path_buf());
        assert!(config.configured_services().unwrap().is_empty());

        std::fs::create_dir_all(config.shared_config_path()).unwrap();
        std::fs::write(config.services_config_path(), "servicio:\n  foo: bar\n").unwrap();
        assert_eq!(config.configured_services().unwrap(), vec!["servicio"]);
    }

    #[test]
    fn for_release_changes_only_the_release() {
        let config = DeployConfig::new("shop");
        let other = config.for_release("20200101000000");
        assert_eq!(other.release_name, "20200101000000");
        assert_eq!(other.app, config.app);
    }
}
