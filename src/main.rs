use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{deploy, hook, restart, rollback, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = VERSION)]
#[command(about = "Zero-downtime release orchestration across application servers")]
struct Cli {
    /// Log at debug level (STAGEHAND_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, push and activate a new release
    Deploy(deploy::DeployArgs),
    /// Point current back at the previous release
    Rollback(rollback::RollbackArgs),
    /// Restart app servers on the latest release
    Restart(restart::RestartArgs),
    /// Run a deploy hook on this host
    #[command(hide = true)]
    Hook(hook::HookArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {
        verbose: cli.verbose,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
