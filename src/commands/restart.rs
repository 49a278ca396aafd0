use clap::Args;
use serde::Serialize;

use stagehand::deploy::{Deploy, DeployReport};
use stagehand::roles::Runner;

use super::{failure_to_error, CmdResult, ConfigArgs, Fleet};

#[derive(Args)]
pub struct RestartArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Serialize)]
pub struct RestartOutput {
    pub command: String,
    pub app: String,
    pub report: DeployReport,
}

pub fn run(args: RestartArgs, global: &crate::commands::GlobalArgs) -> CmdResult<RestartOutput> {
    let config = args.config.load(global)?;
    let fleet = Fleet::from_config(&config)?;
    let runner = Runner::new(&fleet.inventory, &fleet.wrappers);
    let app = config.app.clone();

    let report = Deploy::new(config, runner)
        .restart_with_maintenance_page()
        .map_err(failure_to_error)?;

    Ok((
        RestartOutput {
            command: "restart.run".to_string(),
            app,
            report,
        },
        0,
    ))
}
