//! Host inventory and role model.
//!
//! An [`Inventory`] is the fixed list of already-provisioned hosts. Every host
//! is a [`RemoteTarget`]; role sets are resolved against the inventory each
//! time a command is issued.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::process::CommandResult;
use crate::ssh::SshClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AppMaster,
    App,
    Solo,
    Util,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::AppMaster => "app_master",
            Role::App => "app",
            Role::Solo => "solo",
            Role::Util => "util",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which hosts a command is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSet {
    All,
    Only(Vec<Role>),
}

impl RoleSet {
    pub fn only(roles: &[Role]) -> Self {
        RoleSet::Only(roles.to_vec())
    }

    pub fn matches(&self, roles: &[Role]) -> bool {
        match self {
            RoleSet::All => true,
            RoleSet::Only(wanted) => roles.iter().any(|r| wanted.contains(r)),
        }
    }
}

/// One host the pipeline can act on.
pub trait RemoteTarget: Send + Sync {
    fn hostname(&self) -> &str;

    fn roles(&self) -> &[Role];

    fn name(&self) -> Option<&str>;

    /// Run a full command line on the host and report how it went.
    fn run(&self, command: &str) -> Result<CommandResult>;

    /// Make `path` on the host an exact copy of `path` on the controller.
    fn sync_directory(&self, path: &Path) -> Result<CommandResult>;

    fn roles_label(&self) -> String {
        self.roles()
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Host entry as written in the deploy config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Server {
    pub fn is_valid(&self) -> bool {
        !self.hostname.is_empty() && !self.roles.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct Inventory {
    targets: Vec<Arc<dyn RemoteTarget>>,
}

impl Inventory {
    pub fn new(targets: Vec<Arc<dyn RemoteTarget>>) -> Self {
        Self { targets }
    }

    /// Build SSH targets for configured servers. No servers means a single
    /// solo deploy on this machine.
    pub fn from_servers(servers: &[Server]) -> Result<Self> {
        if servers.is_empty() {
            let local: Arc<dyn RemoteTarget> = Arc::new(SshClient::local(None, vec![Role::Solo]));
            return Ok(Self::new(vec![local]));
        }

        let mut targets: Vec<Arc<dyn RemoteTarget>> = Vec::with_capacity(servers.len());
        for server in servers {
            targets.push(Arc::new(SshClient::from_server(server)?));
        }
        Ok(Self::new(targets))
    }

    pub fn all(&self) -> Vec<Arc<dyn RemoteTarget>> {
        self.targets.clone()
    }

    pub fn from_roles(&self, roles: &RoleSet) -> Vec<Arc<dyn RemoteTarget>> {
        self.targets
            .iter()
            .filter(|t| roles.matches(t.roles()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Inventory {
        Inventory::new(vec![
            Arc::new(SshClient::local(Some("master"), vec![Role::AppMaster])),
            Arc::new(SshClient::local(Some("web"), vec![Role::App])),
            Arc::new(SshClient::local(Some("worker"), vec![Role::Util])),
        ])
    }

    fn names(targets: &[Arc<dyn RemoteTarget>]) -> Vec<String> {
        targets
            .iter()
            .map(|t| t.name().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn all_role_set_selects_every_host() {
        assert_eq!(inventory().from_roles(&RoleSet::All).len(), 3);
    }

    #[test]
    fn explicit_roles_filter_hosts() {
        let selected = inventory().from_roles(&RoleSet::only(&[Role::AppMaster, Role::Solo]));
        assert_eq!(names(&selected), vec!["master"]);

        let selected = inventory().from_roles(&RoleSet::only(&[Role::App, Role::Util]));
        assert_eq!(names(&selected), vec!["web", "worker"]);
    }

    #[test]
    fn empty_server_list_is_a_local_solo_host() {
        let inventory = Inventory::from_servers(&[]).unwrap();
        let all = inventory.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].roles(), &[Role::Solo]);
        assert_eq!(all[0].hostname(), "localhost");
    }

    #[test]
    fn server_deserializes_with_defaults() {
        let server: Server =
            serde_json::from_str(r#"{"hostname":"10.0.0.2","roles":["app_master","util"]}"#)
                .unwrap();
        assert_eq!(server.port, 22);
        assert_eq!(server.roles, vec![Role::AppMaster, Role::Util]);
        assert!(server.is_valid());
    }

    #[test]
    fn roles_label_joins_with_spaces() {
        let target = SshClient::local(None, vec![Role::AppMaster, Role::Util]);
        assert_eq!(target.roles_label(), "app_master util");
    }
}
