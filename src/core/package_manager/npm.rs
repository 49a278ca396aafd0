use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::PackageManager;
use crate::config::DeployConfig;
use crate::error::Result;
use crate::logging::Warnings;
use crate::roles::Runner;
use crate::utils::{io, shell};

pub(super) fn required(release_path: &Path) -> bool {
    release_path.join("package.json").exists()
}

pub(super) fn build(config: &DeployConfig) -> Box<dyn PackageManager> {
    Box::new(Npm::new(config))
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: Map<String, Value>,
}

pub struct Npm {
    config: DeployConfig,
}

impl Npm {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn package_json(&self) -> Result<PackageJson> {
        let content = io::read_file_optional(&self.config.package_json_path(), "read package.json")?;
        // Unparseable package.json is npm's problem to report.
        Ok(content
            .and_then(|c| serde_json::from_str(&c).ok())
            .unwrap_or_default())
    }
}

impl PackageManager for Npm {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn setup(&self, _runner: &Runner, warnings: &mut Warnings) -> Result<()> {
        let services = self.config.configured_services()?;
        if services.is_empty() {
            return Ok(());
        }

        let client = &self.config.services_client;
        if !self.package_json()?.dependencies.contains_key(client) {
            warnings.push(format!(
                "package.json does not contain {}. Add it to get access to: {}.",
                client,
                services.join(", ")
            ));
        }
        Ok(())
    }

    fn installed(&self, runner: &Runner) -> bool {
        runner.probe("which npm 2>&1")
    }

    fn install(&self, runner: &Runner) -> Result<()> {
        runner.run("curl -fsSL https://www.npmjs.com/install.sh | sh")
    }

    fn execute(&self, runner: &Runner) -> Result<()> {
        runner.run(&format!(
            "cd {} && npm install",
            shell::quote_path_arg(&self.config.release_path())
        ))
    }
}
