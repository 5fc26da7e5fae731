use anyhow::Context;
use log::error;
use segtrain::{cli, commands, logging};

fn run() -> anyhow::Result<()> {
	let app_m = cli::build_cli();

	match app_m.subcommand() {
		("train", Some(sub_m)) => commands::train(sub_m).context("Training failed"),
		("resume", Some(sub_m)) => commands::resume(sub_m).context("Resuming failed"),
		("inspect", Some(sub_m)) => commands::inspect(sub_m).context("Could not inspect checkpoint"),
		("generate-config", Some(sub_m)) => {
			commands::generate_config(sub_m).context("Could not generate configuration")
		}
		(name, _) => Err(anyhow::anyhow!("Unknown command: {}", name)),
	}
}

fn main() {
	logging::init_simple_logger();

	if let Err(err) = run() {
		error!("Error: {:#}", err);
		std::process::exit(1);
	}
}
