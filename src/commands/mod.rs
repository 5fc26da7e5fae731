pub mod generate_config;
pub mod inspect;
pub mod resume;
pub mod train;

pub use self::generate_config::generate_config;
pub use self::inspect::inspect;
pub use self::resume::resume;
pub use self::train::train;

use crate::error::{Result, TrainError};
use crate::training::CheckpointKind;
use clap::ArgMatches;
use std::str::FromStr;

/// Parses an optional argument, naming it in the error when the value is malformed.
pub(crate) fn parse_value<T: FromStr>(app_m: &ArgMatches, name: &str) -> Result<Option<T>> {
	match app_m.value_of(name) {
		Some(raw) => raw
			.parse()
			.map(Some)
			.map_err(|_| TrainError::InvalidParameter(format!("Invalid value for {}: {}", name, raw))),
		None => Ok(None),
	}
}

pub(crate) fn parse_checkpoint_kind(app_m: &ArgMatches) -> Result<CheckpointKind> {
	CheckpointKind::from_str(app_m.value_of("CHECKPOINT").unwrap_or("best"))
}

#[cfg(test)]
pub(crate) mod tests {
	use crate::config_file::RunConfigFile;
	use crate::network::UNetConfig;
	use std::path::{Path, PathBuf};

	/// Writes a quiet one-epoch run configuration under `dir`. Returns the file and its experiment directory.
	pub(crate) fn write_tiny_run(dir: &Path) -> (PathBuf, PathBuf) {
		let experiment_dir = dir.join("experiment");
		let mut run = RunConfigFile::generate_default();
		run.trainer.experiment_dir = experiment_dir.clone();
		run.trainer.nb_epochs = 1;
		run.trainer.batch_size = 2;
		run.trainer.logging_verbosity = 0;
		run.network = UNetConfig::new(1, 2).with_nb_levels(1).with_nb_features(vec![2, 4]);
		run.dataset.nb_samples = 4;
		run.dataset.shape = vec![8, 8];

		let path = dir.join("run.toml");
		run.to_toml_file(&path).unwrap();
		(path, experiment_dir)
	}
}
