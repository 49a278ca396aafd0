use clap::Args;
use serde::Serialize;

use stagehand::deploy::{Deploy, DeployReport, RollbackOutcome};
use stagehand::roles::Runner;

use super::{failure_to_error, CmdResult, ConfigArgs, Fleet};

#[derive(Args)]
pub struct RollbackArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Serialize)]
pub struct RollbackOutput {
    pub command: String,
    pub app: String,
    pub rolled_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeployReport>,
}

pub fn run(args: RollbackArgs, global: &crate::commands::GlobalArgs) -> CmdResult<RollbackOutput> {
    let config = args.config.load(global)?;
    let fleet = Fleet::from_config(&config)?;
    let runner = Runner::new(&fleet.inventory, &fleet.wrappers);
    let app = config.app.clone();

    let outcome = Deploy::new(config, runner)
        .rollback()
        .map_err(failure_to_error)?;

    let (report, exit_code) = match outcome {
        RollbackOutcome::RolledBack(report) => (Some(report), 0),
        RollbackOutcome::NothingToRollBack => (None, 1),
    };

    Ok((
        RollbackOutput {
            command: "rollback.run".to_string(),
            app,
            rolled_back: report.is_some(),
            report,
        },
        exit_code,
    ))
}
