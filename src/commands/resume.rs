use super::{parse_checkpoint_kind, parse_value};
use crate::config_file::{DatasetSection, RunConfigFile};
use crate::error::Result;
use crate::network::UNetConfig;
use crate::training::SupervisedTrainer;
use crate::CpuBackend;
use clap::ArgMatches;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub fn resume(app_m: &ArgMatches) -> Result<()> {
	let source = app_m.value_of("SOURCE").unwrap_or(".");
	let kind = parse_checkpoint_kind(app_m)?;

	let device = Default::default();
	let mut trainer = SupervisedTrainer::<CpuBackend>::load(source, kind, &device)?;
	println!("{}", trainer.config());
	println!("{}", trainer.state());
	println!("{}", trainer.network().summary());

	{
		let config = trainer.config_mut();
		if let Some(dir) = app_m.value_of("EXPERIMENT_DIR") {
			config.experiment_dir = PathBuf::from(dir);
		}
		if let Some(epochs) = parse_value(app_m, "EPOCHS")? {
			config.nb_epochs = epochs;
		}
		if let Some(lr) = parse_value(app_m, "LEARNING_RATE")? {
			config.lr = lr;
		}
	}

	let run = RunConfigFile {
		network: trainer.network().config().clone(),
		dataset: dataset_section(app_m, trainer.network().config())?,
		..RunConfigFile::default()
	};
	trainer.prepare_loaders(Arc::new(run.build_dataset::<CpuBackend>(device)?))?;

	info!(
		"Resuming from epoch {} into {}",
		trainer.state().current_epoch,
		trainer.config().experiment_dir.display()
	);
	trainer.train()?;
	println!("{}", trainer.state());
	Ok(())
}

/// Dataset for the continued run: the `[dataset]` section of `--config` when given, otherwise
/// the defaults with each spatial size rounded up to what the restored network accepts.
fn dataset_section(app_m: &ArgMatches, network: &UNetConfig) -> Result<DatasetSection> {
	let mut dataset = match app_m.value_of("CONFIG_FILE") {
		Some(path) => {
			info!("Loaded dataset configuration from: {}", path);
			RunConfigFile::from_path(path)?.dataset
		}
		None => {
			let divisor = network.size_divisor();
			let mut dataset = DatasetSection::default();
			for size in dataset.shape.iter_mut() {
				*size = (*size + divisor - 1) / divisor * divisor;
			}
			dataset
		}
	};
	if let Some(samples) = parse_value(app_m, "SAMPLES")? {
		dataset.nb_samples = samples;
	}
	if let Some(seed) = parse_value(app_m, "SEED")? {
		dataset.seed = seed;
	}
	Ok(dataset)
}
