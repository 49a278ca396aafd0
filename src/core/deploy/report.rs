use std::fmt;

use serde::Serialize;

use crate::error::Error;
use crate::logging::Warnings;

/// Position in the release pipeline. Each value means that step completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Fetching,
    Pushed,
    Copied,
    Revisioned,
    DependenciesInstalled,
    ServicesConfigured,
    ConfigsSymlinked,
    MaintenanceEnabled,
    Migrated,
    AssetsCompiled,
    BeforeHookRun,
    Symlinked,
    AfterHookRun,
    Restarted,
    MaintenanceDisabled,
    CleanedUp,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Succeeded,
    /// Quarantined under `releases_failed/`.
    FailedBeforeSymlink,
    /// `current` was pointed back at the previous release.
    FailedAtSymlink,
    Failed,
}

/// What happened during one deploy, restart or rollback invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub release: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub stage: Stage,
    pub outcome: Outcome,
    pub maintenance_up: bool,
    pub cleanup_failed: bool,
    pub symlink_changed: bool,
    pub callbacks_reached: bool,
    pub migrations_reached: bool,
    pub restart_failed: bool,
    pub warnings: Warnings,
}

impl DeployReport {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            revision: None,
            stage: Stage::Pending,
            outcome: Outcome::InProgress,
            maintenance_up: false,
            cleanup_failed: false,
            symlink_changed: false,
            callbacks_reached: false,
            migrations_reached: false,
            restart_failed: false,
            warnings: Warnings::new(),
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        tracing::debug!("release {} reached {:?}", self.release, stage);
        self.stage = stage;
    }

    /// What still holds after a failed attempt, for the operator.
    pub fn postmortem(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.cleanup_failed {
            lines.push(
                "[Relax] Your site is running new code, but clean up of old deploys failed."
                    .to_string(),
            );
        } else if self.maintenance_up {
            lines.push(
                "[Attention] Maintenance page still up, consider the following before removing:"
                    .to_string(),
            );
            if self.callbacks_reached {
                lines.push(
                    " * Deploy hooks ran. This might cause problems for reverting to old code."
                        .to_string(),
                );
            }
            if self.migrations_reached {
                lines.push(
                    " * Migrations ran. This might cause problems for reverting to old code."
                        .to_string(),
                );
            }
            if self.symlink_changed {
                lines.push(" * Your new code is symlinked as current.".to_string());
            } else {
                lines.push(" * Your old code is still symlinked as current.".to_string());
            }
            if self.restart_failed {
                lines.push(" * Application servers failed to restart.".to_string());
            }
            lines.push(String::new());
            lines.push("Need help? File a ticket for support.".to_string());
        } else {
            lines.push(
                "[Relax] Your site is still running old code and nothing destructive has occurred."
                    .to_string(),
            );
        }

        lines
    }

    pub fn log_postmortem(&self) {
        for line in self.postmortem() {
            log_status!("deploy", "{}", line);
        }
    }
}

/// A failed attempt: the original error plus everything known about it.
#[derive(Debug)]
pub struct DeployFailure {
    pub error: Error,
    pub report: DeployReport,
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for DeployFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
