use clap::Args;
use serde::Serialize;

use stagehand::deploy::{Deploy, DeployReport};
use stagehand::roles::Runner;

use super::{failure_to_error, CmdResult, ConfigArgs, Fleet};

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Deploy whatever the repository cache holds, without fetching
    #[arg(long)]
    pub no_fetch: bool,
}

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    pub app: String,
    pub cached: bool,
    pub report: DeployReport,
}

pub fn run(args: DeployArgs, global: &crate::commands::GlobalArgs) -> CmdResult<DeployOutput> {
    let config = args.config.load(global)?;
    let fleet = Fleet::from_config(&config)?;
    let runner = Runner::new(&fleet.inventory, &fleet.wrappers);
    let app = config.app.clone();

    let deploy = Deploy::new(config, runner);
    let result = if args.no_fetch {
        deploy.cached_deploy()
    } else {
        deploy.deploy()
    };
    let report = result.map_err(failure_to_error)?;

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            app,
            cached: args.no_fetch,
            report,
        },
        0,
    ))
}
