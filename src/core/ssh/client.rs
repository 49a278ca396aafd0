use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::process::{self, CommandResult};
use crate::server::{RemoteTarget, Role, Server};
use crate::utils::shell;

/// SSH transport for one host. Commands are run through the process runner,
/// either wrapped in `ssh` or directly when the host is this machine.
pub struct SshClient {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    roles: Vec<Role>,
    name: Option<String>,
}

impl SshClient {
    pub fn from_server(server: &Server) -> Result<Self> {
        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        server.hostname.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.hostname);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", server.hostname);
        }

        Ok(Self {
            host: server.hostname.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            is_local,
            roles: server.roles.clone(),
            name: server.name.clone(),
        })
    }

    /// A target that runs everything on this machine.
    pub fn local(name: Option<&str>, roles: Vec<Role>) -> Self {
        Self {
            host: "localhost".to_string(),
            user: None,
            port: 22,
            identity_file: None,
            is_local: true,
            roles,
            name: name.map(str::to_string),
        }
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Connection options shared by `ssh` and rsync's `-e` transport.
    fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never prompt, never hang on a stalled connection.
        args.extend(
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "ServerAliveInterval=15",
                "-o",
                "ServerAliveCountMax=3",
            ]
            .map(String::from),
        );

        args
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["ssh".to_string()];
        args.extend(self.connection_args());
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    pub fn execute(&self, command: &str) -> Result<CommandResult> {
        if self.is_local {
            return process::spawn(command);
        }

        let line = shell::quote_args(&self.build_ssh_args(command));
        let result = self.execute_with_retry(&line, &COMMAND_RETRY)?;
        Ok(CommandResult::new(command, result.exit_status, result.output))
    }

    /// Re-run `line` only while ssh itself could not reach the host. Anything
    /// the remote command printed or returned is final.
    fn execute_with_retry(&self, line: &str, policy: &RetryPolicy) -> Result<CommandResult> {
        let mut attempt = 0;
        loop {
            let result = process::spawn(line)?;
            attempt += 1;

            if attempt >= policy.attempts || !policy.connection_failed(&result) {
                return Ok(result);
            }

            let delay = policy.backoff_secs.get(attempt - 1).copied().unwrap_or(0);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt,
                policy.attempts,
                delay
            );
            thread::sleep(Duration::from_secs(delay));
        }
    }

    fn rsync_line(&self, path: &str) -> String {
        let mut transport = vec!["ssh".to_string()];
        transport.extend(self.connection_args());

        let source = format!("{}/", path.trim_end_matches('/'));
        let dest = format!("{}:{}", self.destination(), path);
        shell::quote_args(&[
            "rsync".to_string(),
            "-aq".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            shell::quote_args(&transport),
            source,
            dest,
        ])
    }
}

impl RemoteTarget for SshClient {
    fn hostname(&self) -> &str {
        &self.host
    }

    fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn run(&self, command: &str) -> Result<CommandResult> {
        self.execute(command)
    }

    fn sync_directory(&self, path: &Path) -> Result<CommandResult> {
        let path = path.to_string_lossy();
        let label = format!("sync {}", path);

        // The controller's copy already is the host's copy.
        if self.is_local {
            return Ok(CommandResult::new(label, 0, ""));
        }

        let prepared = self.execute(&format!("mkdir -p {}", shell::quote_arg(&path)))?;
        if !prepared.success() {
            return Ok(prepared);
        }

        let result = self.execute_with_retry(&self.rsync_line(&path), &SYNC_RETRY)?;
        Ok(CommandResult::new(label, result.exit_status, result.output))
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// When a command line is worth running again.
struct RetryPolicy {
    attempts: usize,
    /// Delay before each retry.
    backoff_secs: &'static [u64],
    /// Exit codes the transport uses for "never got to run the command".
    connect_exits: &'static [i32],
}

/// ssh reserves 255 for its own failures.
const COMMAND_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    backoff_secs: &[2, 5],
    connect_exits: &[255],
};

/// rsync reports a dead ssh transport as 12 or 255. A re-sync is harmless.
const SYNC_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    backoff_secs: &[2, 5],
    connect_exits: &[12, 255],
};

/// Lines ssh prints when it gives up before the remote side runs anything.
const SSH_CONNECT_ERRORS: &[&str] = &[
    "ssh: connect to host",
    "ssh: could not resolve hostname",
    "kex_exchange_identification:",
    "ssh_exchange_identification:",
    "connection closed by remote host",
];

impl RetryPolicy {
    fn connection_failed(&self, result: &CommandResult) -> bool {
        self.connect_exits.contains(&result.exit_status) && is_ssh_connect_error(&result.output)
    }
}

/// True when some line of `output` is ssh's own connection diagnostic.
fn is_ssh_connect_error(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim_start().to_lowercase();
        SSH_CONNECT_ERRORS.iter().any(|p| line.starts_with(p))
    })
}
