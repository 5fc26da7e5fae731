use super::parse_checkpoint_kind;
use crate::error::Result;
use crate::training::{resolve_checkpoint, SupervisedTrainer};
use crate::CpuBackend;
use clap::ArgMatches;

pub fn inspect(app_m: &ArgMatches) -> Result<()> {
	let source = app_m.value_of("SOURCE").unwrap_or(".");
	let kind = parse_checkpoint_kind(app_m)?;

	let path = resolve_checkpoint(source, kind)?;
	let trainer = SupervisedTrainer::<CpuBackend>::load(&path, kind, &Default::default())?;

	println!("Checkpoint: {}", path.display());
	println!("{}", trainer.config());
	println!("{}", trainer.state());
	println!("Loss: {}", trainer.loss());
	println!("Optimizer: {}", trainer.optimizer_config());
	println!("{}", trainer.network().summary());
	Ok(())
}
