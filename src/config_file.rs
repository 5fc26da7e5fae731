use crate::config::TrainerConfig;
use crate::constants::{dataset as dataset_defaults, optimizer as optimizer_defaults};
use crate::dataset::SyntheticSegmentationDataset;
use crate::error::{Result, TrainError};
use crate::loss::SegmentationLoss;
use crate::network::UNetConfig;
use crate::optim::OptimizerConfig;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A complete run description for the command line: trainer, network, data, optimizer and loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfigFile {
	#[serde(default)]
	pub trainer: TrainerConfig,

	#[serde(default)]
	pub network: UNetConfig,

	#[serde(default)]
	pub dataset: DatasetSection,

	#[serde(default)]
	pub optimizer: OptimizerSection,

	#[serde(default)]
	pub loss: SegmentationLoss,
}

/// Synthetic dataset parameters. Channel counts come from the network section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
	pub nb_samples: usize,

	/// Spatial size `[height, width]`
	pub shape: Vec<usize>,

	/// Independent binary masks per output channel instead of exclusive classes
	pub multi_label: bool,

	pub nb_shapes: usize,

	pub noise: f32,

	pub seed: u64,
}

impl Default for DatasetSection {
	fn default() -> Self {
		Self {
			nb_samples: dataset_defaults::DEFAULT_NB_SAMPLES,
			shape: dataset_defaults::DEFAULT_SHAPE.to_vec(),
			multi_label: false,
			nb_shapes: dataset_defaults::DEFAULT_NB_SHAPES,
			noise: dataset_defaults::DEFAULT_NOISE,
			seed: dataset_defaults::DEFAULT_SEED,
		}
	}
}

/// Flat optimizer description; fields that do not apply to `kind` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSection {
	/// "adam" or "sgd"
	pub kind: String,

	pub beta1: f32,

	pub beta2: f32,

	pub epsilon: f32,

	pub momentum: Option<f64>,

	pub weight_decay: Option<f32>,
}

impl Default for OptimizerSection {
	fn default() -> Self {
		Self {
			kind: "adam".to_string(),
			beta1: optimizer_defaults::ADAM_BETA1,
			beta2: optimizer_defaults::ADAM_BETA2,
			epsilon: optimizer_defaults::ADAM_EPSILON,
			momentum: None,
			weight_decay: None,
		}
	}
}

impl From<&OptimizerConfig> for OptimizerSection {
	fn from(config: &OptimizerConfig) -> Self {
		match *config {
			OptimizerConfig::Adam {
				beta1,
				beta2,
				epsilon,
				weight_decay,
			} => Self {
				kind: "adam".to_string(),
				beta1,
				beta2,
				epsilon,
				momentum: None,
				weight_decay,
			},
			OptimizerConfig::Sgd { momentum, weight_decay } => Self {
				kind: "sgd".to_string(),
				momentum,
				weight_decay,
				..Self::default()
			},
		}
	}
}

impl RunConfigFile {
	/// Load configuration from a TOML file
	pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let contents = read_config(path.as_ref())?;
		toml::from_str(&contents).map_err(|e| TrainError::Parse(format!("Failed to parse TOML config: {}", e)))
	}

	/// Load configuration from a JSON file
	pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let contents = read_config(path.as_ref())?;
		serde_json::from_str(&contents).map_err(|e| TrainError::Parse(format!("Failed to parse JSON config: {}", e)))
	}

	/// Picks the format from the extension, TOML unless it is `.json`.
	pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		match path.extension().and_then(|e| e.to_str()) {
			Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_file(path),
			_ => Self::from_toml_file(path),
		}
	}

	pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let contents = toml::to_string_pretty(self)
			.map_err(|e| TrainError::Serialization(format!("Failed to serialize to TOML: {}", e)))?;
		fs::write(path, contents)?;
		Ok(())
	}

	pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let contents = serde_json::to_string_pretty(self)
			.map_err(|e| TrainError::Serialization(format!("Failed to serialize to JSON: {}", e)))?;
		fs::write(path, contents)?;
		Ok(())
	}

	pub fn to_trainer_config(&self) -> Result<TrainerConfig> {
		self.trainer.validate()?;
		Ok(self.trainer.clone())
	}

	pub fn to_network_config(&self) -> Result<UNetConfig> {
		self.network.validate()?;
		Ok(self.network.clone())
	}

	pub fn to_optimizer_config(&self) -> Result<OptimizerConfig> {
		let section = &self.optimizer;
		match section.kind.to_lowercase().as_str() {
			"adam" => Ok(OptimizerConfig::Adam {
				beta1: section.beta1,
				beta2: section.beta2,
				epsilon: section.epsilon,
				weight_decay: section.weight_decay,
			}),
			"sgd" => Ok(OptimizerConfig::Sgd {
				momentum: section.momentum,
				weight_decay: section.weight_decay,
			}),
			other => Err(TrainError::InvalidParameter(format!(
				"Invalid optimizer: {}. Must be adam or sgd",
				other
			))),
		}
	}

	pub fn to_loss(&self) -> SegmentationLoss {
		self.loss.clone()
	}

	/// Builds the synthetic dataset matching the network's input and output channels.
	pub fn build_dataset<B: Backend>(&self, device: B::Device) -> Result<SyntheticSegmentationDataset<B>> {
		let section = &self.dataset;
		let (height, width) = match section.shape.as_slice() {
			[h, w] => (*h, *w),
			other => {
				return Err(TrainError::InvalidParameter(format!(
					"Dataset shape must be [height, width], got {:?}",
					other
				)))
			}
		};
		let divisor = self.network.size_divisor();
		if height % divisor != 0 || width % divisor != 0 {
			return Err(TrainError::InvalidParameter(format!(
				"Dataset shape {}x{} must be divisible by {} for a network with {} levels",
				height, width, divisor, self.network.nb_levels
			)));
		}

		let nb_classes = if section.multi_label {
			None
		} else {
			Some(self.network.out_channels)
		};
		Ok(SyntheticSegmentationDataset::new(
			section.nb_samples,
			[self.network.in_channels, height, width],
			[self.network.out_channels, height, width],
			nb_classes,
			device,
		)?
		.with_nb_shapes(section.nb_shapes)
		.with_noise(section.noise)?
		.with_seed(section.seed))
	}

	/// Generate a default configuration file
	pub fn generate_default() -> Self {
		Self::default()
	}

	/// Create an example configuration file with comments
	pub fn create_example_toml() -> String {
		r#"# segtrain run configuration

[trainer]
# Receives checkpoints/, metrics.jsonl and model.txt
experiment_dir = "experiments/default"
nb_epochs = 100
batch_size = 1
lr = 0.0001

# 0: silent, 1: losses, 2: losses, parameter histograms and model structure
logging_verbosity = 1

# Stop after this many epochs without eval improvement (0 disables)
early_stopping = 0

# Wipe experiment_dir before training
refresh_experiment_dir = false

# Fraction of samples used for training, the rest for evaluation
train_to_val = 0.8

# Data loading threads (0 loads on the training thread)
num_workers = 0

[network]
in_channels = 1
out_channels = 2

# Down-sampling steps; spatial sizes must be divisible by 2^nb_levels
nb_levels = 2

# Features per level plus the bottleneck, padded with the last value
nb_features = [16, 32, 64]
kernel_size = 3

[dataset]
nb_samples = 32
shape = [32, 32]

# Independent masks per output channel instead of one-hot classes
multi_label = false
nb_shapes = 3
noise = 0.1
seed = 0

[optimizer]
# "adam" or "sgd"
kind = "adam"
beta1 = 0.9
beta2 = 0.999
epsilon = 1e-8
# momentum = 0.9
# weight_decay = 0.0001

[loss]
# "dice", "cross_entropy" or "mse"
kind = "dice"
# "softmax" or "sigmoid"
activation = "softmax"
smooth = 1e-5
"#
		.to_string()
	}
}

fn read_config(path: &Path) -> Result<String> {
	if !path.exists() {
		return Err(TrainError::FileNotFound(path.to_path_buf()));
	}
	Ok(fs::read_to_string(path)?)
}
