mod utils {
    pub mod command;
    pub mod confirm;
    pub mod errors;
    pub mod logger;
    pub mod reporter;
}

mod adapters;
mod capabilities;
mod config;
mod ipc_policy;
mod policy;
mod preflight;
mod provisioners;
mod runner;
mod service;
mod summary;
mod system_state;
mod verify;
mod workflow;

use clap::Parser;
use config::ProvisionConfig;
use log::info;
use runner::Target;
use system_state::SystemState;
use utils::confirm::{AutoYes, Confirm, TerminalConfirm};

/// Provision power daemons that keep CPU and GPU clocks up for simulation.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Which daemon to provision
    #[arg(value_enum)]
    target: Target,

    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// GPU power cap (watts) that counts as a successful boost
    #[arg(long, value_name = "WATTS")]
    threshold_watts: Option<f64>,
}

#[tokio::main]
async fn main() {
    utils::logger::setup_logger();
    let cli = Cli::parse();

    let mut config = ProvisionConfig::default();
    if let Some(watts) = cli.threshold_watts {
        config = config.with_power_cap_threshold(watts);
    }

    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(AutoYes)
    } else {
        Box::new(TerminalConfirm)
    };

    info!("Provisioning {:?}", cli.target);
    let mut state = SystemState::local();
    let code = runner::run_until_interrupted(
        runner::provision(cli.target, &config, &mut state, confirm.as_ref()),
        runner::interrupted(),
    )
    .await;

    std::process::exit(code);
}
