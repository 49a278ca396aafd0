//! Fan-out / join over a set of targets.
//!
//! Every target gets its own thread; all threads are started before the first
//! join. One target failing, or panicking, never stops its siblings.

use std::any::Any;
use std::sync::Arc;
use std::thread;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::process::CommandResult;
use crate::server::RemoteTarget;

/// Result of running one operation against one target.
pub struct ExecutionOutcome {
    pub target: Arc<dyn RemoteTarget>,
    pub outcome: Result<CommandResult>,
}

impl ExecutionOutcome {
    pub fn is_error(&self) -> bool {
        match &self.outcome {
            Ok(result) => !result.success(),
            Err(_) => true,
        }
    }

    pub fn inspect(&self) -> String {
        match &self.outcome {
            Ok(result) => format!("{}:\n{}", self.target.hostname(), result.inspect()),
            Err(err) => format!("{}:\n{}\n", self.target.hostname(), err.message),
        }
    }

    pub fn failure_details(&self) -> RemoteCommandFailedDetails {
        let host = self.target.hostname().to_string();
        match &self.outcome {
            Ok(result) => RemoteCommandFailedDetails {
                host,
                command: Some(result.command.clone()),
                exit_code: Some(result.exit_status),
                output: result.output.clone(),
            },
            Err(err) => RemoteCommandFailedDetails {
                host,
                command: None,
                exit_code: None,
                output: err.message.clone(),
            },
        }
    }
}

/// Run `operation` against every target concurrently and wait for all of them.
/// Outcomes come back in target order.
pub fn run_all<F>(targets: &[Arc<dyn RemoteTarget>], operation: F) -> Vec<ExecutionOutcome>
where
    F: Fn(&dyn RemoteTarget) -> Result<CommandResult> + Sync,
{
    let operation = &operation;

    thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let target = Arc::clone(target);
                scope.spawn(move || operation(target.as_ref()))
            })
            .collect();

        targets
            .iter()
            .zip(handles)
            .map(|(target, handle)| ExecutionOutcome {
                target: Arc::clone(target),
                outcome: handle.join().unwrap_or_else(|panic| Err(panicked(panic))),
            })
            .collect()
    })
}

fn panicked(panic: Box<dyn Any + Send>) -> Error {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Error::internal_unexpected(format!("Execution thread panicked: {}", reason))
}

pub fn all_succeeded(outcomes: &[ExecutionOutcome]) -> bool {
    outcomes.iter().all(|o| !o.is_error())
}

/// Concatenated inspection of every failing outcome.
pub fn describe_failures(outcomes: &[ExecutionOutcome]) -> String {
    outcomes
        .iter()
        .filter(|o| o.is_error())
        .map(ExecutionOutcome::inspect)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn a batch into a single aggregated error if anything failed.
pub fn ensure_all_succeeded(outcomes: &[ExecutionOutcome]) -> Result<()> {
    if all_succeeded(outcomes) {
        return Ok(());
    }

    let failures = outcomes
        .iter()
        .filter(|o| o.is_error())
        .map(ExecutionOutcome::failure_details)
        .collect();
    Err(Error::remote_failure(describe_failures(outcomes), failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Role;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    struct Scripted {
        host: String,
        behavior: &'static str,
    }

    impl RemoteTarget for Scripted {
        fn hostname(&self) -> &str {
            &self.host
        }

        fn roles(&self) -> &[Role] {
            &[Role::App]
        }

        fn name(&self) -> Option<&str> {
            None
        }

        fn run(&self, command: &str) -> Result<CommandResult> {
            match self.behavior {
                "fail" => Ok(CommandResult::new(command, 2, "exploded")),
                "error" => Err(Error::internal_unexpected("transport down")),
                "panic" => panic!("target blew up"),
                _ => Ok(CommandResult::new(command, 0, "ok")),
            }
        }

        fn sync_directory(&self, path: &Path) -> Result<CommandResult> {
            self.run(&format!("sync {}", path.display()))
        }
    }

    fn targets(behaviors: &[&'static str]) -> Vec<Arc<dyn RemoteTarget>> {
        behaviors
            .iter()
            .enumerate()
            .map(|(i, behavior)| {
                Arc::new(Scripted {
                    host: format!("host{}", i + 1),
                    behavior: *behavior,
                }) as Arc<dyn RemoteTarget>
            })
            .collect()
    }

    #[test]
    fn empty_batch_is_successful() {
        let outcomes = run_all(&[], |t| t.run("true"));
        assert!(outcomes.is_empty());
        assert!(all_succeeded(&outcomes));
        assert!(ensure_all_succeeded(&outcomes).is_ok());
    }

    #[test]
    fn one_failure_does_not_hide_siblings() {
        let outcomes = run_all(&targets(&["ok", "fail", "ok"]), |t| t.run("deploy"));
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_error());
        assert!(outcomes[1].is_error());
        assert!(!outcomes[2].is_error());
        assert!(!all_succeeded(&outcomes));
    }

    #[test]
    fn errors_and_panics_become_failed_outcomes() {
        let outcomes = run_all(&targets(&["error", "panic", "ok"]), |t| t.run("deploy"));
        assert!(outcomes[0].is_error());
        assert!(outcomes[1].is_error());
        assert!(!outcomes[2].is_error());
        let err = outcomes[1].outcome.as_ref().err().unwrap();
        assert!(err.message.contains("target blew up"));
    }

    #[test]
    fn failures_are_aggregated_with_host_and_command() {
        let outcomes = run_all(&targets(&["ok", "fail", "fail"]), |t| t.run("migrate"));
        let err = ensure_all_succeeded(&outcomes).unwrap_err();
        assert_eq!(err.code.as_str(), "remote.command_failed");
        assert!(err.message.contains("host2:\n$ migrate\n# => 2"));
        assert!(err.message.contains("host3:"));
        assert!(!err.message.contains("host1"));

        let failures = err.remote_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].host, "host2");
        assert_eq!(failures[0].command.as_deref(), Some("migrate"));
        assert_eq!(failures[0].exit_code, Some(2));
    }

    #[test]
    fn all_targets_run_concurrently() {
        let batch = targets(&["ok", "ok", "ok"]);
        let barrier = Barrier::new(batch.len());
        let calls = AtomicUsize::new(0);

        // Deadlocks unless every unit is started before any is joined.
        let outcomes = run_all(&batch, |t| {
            calls.fetch_add(1, Ordering::SeqCst);
            barrier.wait();
            t.run("true")
        });

        assert!(all_succeeded(&outcomes));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
