//! Role-scoped command dispatch.
//!
//! A [`Runner`] carries the role scope as an immutable value. Narrowing the
//! scope with [`Runner::with_roles`] hands a new runner to the closure, so the
//! outer scope is untouched on every exit path.

use std::path::Path;
use std::sync::Arc;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::parallel::{self, ExecutionOutcome};
use crate::server::{Inventory, RemoteTarget, Role, RoleSet};
use crate::utils::shell;

/// Command prefixes for plain and privileged execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrappers {
    pub shell: Vec<String>,
    pub privileged: Vec<String>,
}

impl Default for Wrappers {
    fn default() -> Self {
        Self {
            shell: ["sh", "-l", "-c"].map(String::from).to_vec(),
            privileged: ["sudo", "sh", "-l", "-c"].map(String::from).to_vec(),
        }
    }
}

impl Wrappers {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            shell: config.shell_wrapper.clone(),
            privileged: config.privileged_wrapper.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Runner<'a> {
    inventory: &'a Inventory,
    wrappers: &'a Wrappers,
    scope: RoleSet,
}

impl<'a> Runner<'a> {
    pub fn new(inventory: &'a Inventory, wrappers: &'a Wrappers) -> Self {
        Self {
            inventory,
            wrappers,
            scope: RoleSet::All,
        }
    }

    pub fn scope(&self) -> &RoleSet {
        &self.scope
    }

    pub fn with_roles<T>(&self, roles: &[Role], body: impl FnOnce(&Runner<'a>) -> T) -> T {
        let scoped = Runner {
            inventory: self.inventory,
            wrappers: self.wrappers,
            scope: RoleSet::only(roles),
        };
        body(&scoped)
    }

    /// Targets in scope, resolved now.
    pub fn targets(&self) -> Vec<Arc<dyn RemoteTarget>> {
        self.inventory.from_roles(&self.scope)
    }

    pub fn run(&self, command: &str) -> Result<()> {
        self.run_with(command, |_, base| base.to_string())
    }

    pub fn sudo(&self, command: &str) -> Result<()> {
        self.sudo_with(command, |_, base| base.to_string())
    }

    /// Like [`Runner::run`], but `customize` rewrites the command per target.
    pub fn run_with<F>(&self, command: &str, customize: F) -> Result<()>
    where
        F: Fn(&dyn RemoteTarget, &str) -> String + Sync,
    {
        let outcomes = self.dispatch(&self.wrappers.shell, command, &customize);
        parallel::ensure_all_succeeded(&outcomes)
    }

    pub fn sudo_with<F>(&self, command: &str, customize: F) -> Result<()>
    where
        F: Fn(&dyn RemoteTarget, &str) -> String + Sync,
    {
        let outcomes = self.dispatch(&self.wrappers.privileged, command, &customize);
        parallel::ensure_all_succeeded(&outcomes)
    }

    /// True when the command succeeds on every target in scope.
    pub fn probe(&self, command: &str) -> bool {
        let outcomes = self.dispatch(&self.wrappers.shell, command, &|_, base| base.to_string());
        parallel::all_succeeded(&outcomes)
    }

    pub fn probe_privileged(&self, command: &str) -> bool {
        let outcomes =
            self.dispatch(&self.wrappers.privileged, command, &|_, base| base.to_string());
        parallel::all_succeeded(&outcomes)
    }

    /// Mirror a controller directory onto every target in scope.
    pub fn sync_directory(&self, path: &Path) -> Result<()> {
        let outcomes = parallel::run_all(&self.targets(), |target| target.sync_directory(path));
        parallel::ensure_all_succeeded(&outcomes)
    }

    fn dispatch(
        &self,
        wrapper: &[String],
        command: &str,
        customize: &(dyn Fn(&dyn RemoteTarget, &str) -> String + Sync),
    ) -> Vec<ExecutionOutcome> {
        parallel::run_all(&self.targets(), |target| {
            let command = customize(target, command);
            target.run(&shell::wrap_command(wrapper, &command))
        })
    }
}
