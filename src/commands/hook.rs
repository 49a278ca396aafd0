use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use stagehand::hooks::{self, HookContext};

use super::GlobalArgs;

/// Invoked by the controller on each host; not meant for operators.
#[derive(Args)]
pub struct HookArgs {
    /// Hook name, e.g. before_symlink
    pub name: String,

    #[arg(long)]
    pub app: String,

    #[arg(long)]
    pub release_path: PathBuf,

    #[arg(long, default_value = "production")]
    pub framework_env: String,

    /// Space-separated roles of this host
    #[arg(long, default_value = "")]
    pub current_roles: String,

    #[arg(long)]
    pub current_name: Option<String>,

    /// Deploy config as JSON
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Serialize)]
pub struct HookOutput {
    pub command: String,
    pub hook: String,
    pub ran: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
}

impl From<HookArgs> for HookContext {
    fn from(args: HookArgs) -> Self {
        HookContext {
            name: args.name,
            app: args.app,
            release_path: args.release_path,
            framework_env: args.framework_env,
            current_roles: args.current_roles,
            current_name: args.current_name,
            config: args.config,
        }
    }
}

pub fn run(args: HookArgs, global: &GlobalArgs) -> super::CmdResult<HookOutput> {
    stagehand::logging::init(global.verbose);
    let context = HookContext::from(args);
    let result = hooks::execute(&context)?;

    let output = HookOutput {
        command: "hook.run".to_string(),
        hook: context.name.clone(),
        ran: result.is_some(),
        exit_status: result.as_ref().map(|r| r.exit_status),
    };

    match result {
        Some(result) if !result.success() => Err(stagehand::Error::hook_failed(
            context.name,
            result.exit_status,
            result.output,
        )),
        _ => Ok((output, 0)),
    }
}

/// Like the other commands, except a failing hook's own status is the exit code.
pub fn run_json(
    args: HookArgs,
    global: &GlobalArgs,
) -> (stagehand::Result<serde_json::Value>, i32) {
    match run(args, global) {
        Err(err) if err.code == stagehand::ErrorCode::HookFailed => {
            let status = err.details["exitCode"].as_i64().unwrap_or(1) as i32;
            (Err(err), status)
        }
        other => crate::output::map_cmd_result_to_json(other),
    }
}
