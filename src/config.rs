use crate::constants::{checkpoint, trainer};
use crate::error::{Result, TrainError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Hyperparameters and bookkeeping options of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
	/// Directory receiving checkpoints, metrics and the model summary.
	pub experiment_dir: PathBuf,
	pub nb_epochs: usize,
	pub batch_size: usize,
	pub lr: f64,
	/// 0: nothing, 1: train/eval losses, 2: also parameter histograms and model structure.
	pub logging_verbosity: u8,
	/// Patience in epochs without eval improvement. 0 disables early stopping.
	pub early_stopping: usize,
	/// Delete the contents of `experiment_dir` when training starts.
	pub refresh_experiment_dir: bool,
	/// Fraction of the dataset used for training, the rest is used for evaluation.
	pub train_to_val: f64,
	pub num_workers: usize,
}

impl Default for TrainerConfig {
	fn default() -> Self {
		Self::new(trainer::DEFAULT_EXPERIMENT_DIR)
	}
}

impl TrainerConfig {
	pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
		Self {
			experiment_dir: experiment_dir.into(),
			nb_epochs: trainer::DEFAULT_NB_EPOCHS,
			batch_size: trainer::DEFAULT_BATCH_SIZE,
			lr: trainer::DEFAULT_LEARNING_RATE,
			logging_verbosity: trainer::DEFAULT_LOGGING_VERBOSITY,
			early_stopping: trainer::DEFAULT_EARLY_STOPPING,
			refresh_experiment_dir: false,
			train_to_val: trainer::DEFAULT_TRAIN_TO_VAL,
			num_workers: trainer::DEFAULT_NUM_WORKERS,
		}
	}

	pub fn builder(experiment_dir: impl Into<PathBuf>) -> TrainerConfigBuilder {
		TrainerConfigBuilder::new(experiment_dir)
	}

	pub fn checkpoint_dir(&self) -> PathBuf {
		self.experiment_dir.join(checkpoint::SUBDIR)
	}

	pub fn validate(&self) -> Result<()> {
		if self.experiment_dir.as_os_str().is_empty() {
			return Err(TrainError::InvalidParameter(
				"Experiment directory must not be empty".into(),
			));
		}
		if self.batch_size == 0 {
			return Err(TrainError::InvalidParameter(format!(
				"Batch size ({}) must be greater than 0",
				self.batch_size
			)));
		}
		if !self.lr.is_finite() || self.lr < 0.0 {
			return Err(TrainError::InvalidParameter(format!(
				"Learning rate ({}) must be a finite, non-negative number",
				self.lr
			)));
		}
		if !(0.0..=1.0).contains(&self.train_to_val) {
			return Err(TrainError::InvalidParameter(format!(
				"Train to validation ratio ({}) must be within [0, 1]",
				self.train_to_val
			)));
		}
		if self.logging_verbosity > trainer::MAX_LOGGING_VERBOSITY {
			return Err(TrainError::InvalidParameter(format!(
				"Logging verbosity ({}) must be 0, 1 or 2",
				self.logging_verbosity
			)));
		}
		Ok(())
	}
}

impl fmt::Display for TrainerConfig {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "TrainerConfig(")?;
		writeln!(f, "  experiment_dir: {}", self.experiment_dir.display())?;
		writeln!(f, "  nb_epochs: {}", self.nb_epochs)?;
		writeln!(f, "  batch_size: {}", self.batch_size)?;
		writeln!(f, "  lr: {}", self.lr)?;
		writeln!(f, "  logging_verbosity: {}", self.logging_verbosity)?;
		writeln!(f, "  early_stopping: {}", self.early_stopping)?;
		writeln!(f, "  refresh_experiment_dir: {}", self.refresh_experiment_dir)?;
		writeln!(f, "  train_to_val: {}", self.train_to_val)?;
		writeln!(f, "  num_workers: {}", self.num_workers)?;
		write!(f, ")")
	}
}

pub struct TrainerConfigBuilder {
	config: TrainerConfig,
}

impl TrainerConfigBuilder {
	pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
		Self {
			config: TrainerConfig::new(experiment_dir),
		}
	}

	pub fn nb_epochs(mut self, nb_epochs: usize) -> Self {
		self.config.nb_epochs = nb_epochs;
		self
	}

	pub fn batch_size(mut self, batch_size: usize) -> Self {
		self.config.batch_size = batch_size;
		self
	}

	pub fn lr(mut self, lr: f64) -> Self {
		self.config.lr = lr;
		self
	}

	pub fn logging_verbosity(mut self, verbosity: u8) -> Self {
		self.config.logging_verbosity = verbosity;
		self
	}

	pub fn early_stopping(mut self, patience: usize) -> Self {
		self.config.early_stopping = patience;
		self
	}

	pub fn refresh_experiment_dir(mut self, refresh: bool) -> Self {
		self.config.refresh_experiment_dir = refresh;
		self
	}

	pub fn train_to_val(mut self, ratio: f64) -> Self {
		self.config.train_to_val = ratio;
		self
	}

	pub fn num_workers(mut self, num_workers: usize) -> Self {
		self.config.num_workers = num_workers;
		self
	}

	pub fn build(self) -> TrainerConfig {
		self.config
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StateFormat {
	Toml,
	Json,
}

/// Saving and loading plain state containers, with the format picked from the file extension.
pub trait StateFile: Serialize + DeserializeOwned + Sized {
	fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let path = path.as_ref();
		let contents = match state_format(path)? {
			StateFormat::Toml => toml::to_string_pretty(self)?,
			StateFormat::Json => serde_json::to_string_pretty(self)?,
		};
		fs::write(path, contents)?;
		Ok(())
	}

	fn load_state<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		let format = state_format(path)?;
		if !path.exists() {
			return Err(TrainError::FileNotFound(path.to_path_buf()));
		}
		let contents = fs::read_to_string(path)?;
		match format {
			StateFormat::Toml => Ok(toml::from_str(&contents)?),
			StateFormat::Json => Ok(serde_json::from_str(&contents)?),
		}
	}
}

impl<T: Serialize + DeserializeOwned> StateFile for T {}

fn state_format(path: &Path) -> Result<StateFormat> {
	match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
		Some("toml") => Ok(StateFormat::Toml),
		Some("json") => Ok(StateFormat::Json),
		_ => Err(TrainError::InvalidParameter(format!(
			"Unsupported state file {}: expected a .toml or .json extension",
			path.display()
		))),
	}
}
