use super::parse_value;
use crate::config_file::RunConfigFile;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::network::SegmentationNetwork;
use crate::training::SupervisedTrainer;
use crate::CpuBackend;
use clap::ArgMatches;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub fn train(app_m: &ArgMatches) -> Result<()> {
	let mut run = match app_m.value_of("CONFIG_FILE") {
		Some(path) => {
			info!("Loaded configuration from: {}", path);
			RunConfigFile::from_path(path)?
		}
		None => RunConfigFile::generate_default(),
	};
	apply_overrides(app_m, &mut run)?;

	let device = Default::default();
	let trainer_config = run.to_trainer_config()?;
	let network = SegmentationNetwork::<CpuBackend>::new(run.to_network_config()?, &device)?;
	let dataset: Arc<dyn Dataset<CpuBackend>> = Arc::new(run.build_dataset::<CpuBackend>(device)?);

	println!("{}", trainer_config);
	println!("{}", network.summary());
	println!("{}", run.loss);

	let mut trainer = SupervisedTrainer::new(
		network,
		run.to_optimizer_config()?,
		run.to_loss(),
		Some(dataset),
		trainer_config,
	)?;
	trainer.train()?;

	if let Some(path) = app_m.value_of("SAVE") {
		trainer.save(path)?;
	}
	println!("{}", trainer.state());
	Ok(())
}

fn apply_overrides(app_m: &ArgMatches, run: &mut RunConfigFile) -> Result<()> {
	if let Some(dir) = app_m.value_of("EXPERIMENT_DIR") {
		run.trainer.experiment_dir = PathBuf::from(dir);
	}
	if let Some(epochs) = parse_value(app_m, "EPOCHS")? {
		run.trainer.nb_epochs = epochs;
	}
	if let Some(batch_size) = parse_value(app_m, "BATCH_SIZE")? {
		run.trainer.batch_size = batch_size;
	}
	if let Some(lr) = parse_value(app_m, "LEARNING_RATE")? {
		run.trainer.lr = lr;
	}
	if let Some(samples) = parse_value(app_m, "SAMPLES")? {
		run.dataset.nb_samples = samples;
	}
	if app_m.is_present("REFRESH") {
		run.trainer.refresh_experiment_dir = true;
	}
	Ok(())
}
