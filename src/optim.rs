use crate::constants::optimizer as defaults;
use crate::error::Result;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optimizer hyperparameters other than the learning rate, which lives in the trainer configuration.
///
/// Externally tagged: bincode cannot decode internally tagged enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
	Adam {
		beta1: f32,
		beta2: f32,
		epsilon: f32,
		weight_decay: Option<f32>,
	},
	Sgd {
		momentum: Option<f64>,
		weight_decay: Option<f32>,
	},
}

impl Default for OptimizerConfig {
	fn default() -> Self {
		Self::adam()
	}
}

impl OptimizerConfig {
	pub fn adam() -> Self {
		OptimizerConfig::Adam {
			beta1: defaults::ADAM_BETA1,
			beta2: defaults::ADAM_BETA2,
			epsilon: defaults::ADAM_EPSILON,
			weight_decay: None,
		}
	}

	pub fn sgd() -> Self {
		OptimizerConfig::Sgd {
			momentum: None,
			weight_decay: None,
		}
	}

	/// Builds an optimizer bound to the parameters of modules of type `M`.
	pub fn init<B, M>(&self) -> Box<dyn TrainableOptimizer<B, M>>
	where
		B: AutodiffBackend,
		M: AutodiffModule<B> + 'static,
	{
		match *self {
			OptimizerConfig::Adam {
				beta1,
				beta2,
				epsilon,
				weight_decay,
			} => Box::new(
				AdamConfig::new()
					.with_beta_1(beta1)
					.with_beta_2(beta2)
					.with_epsilon(epsilon)
					.with_weight_decay(weight_decay.map(WeightDecayConfig::new))
					.init::<B, M>(),
			),
			OptimizerConfig::Sgd { momentum, weight_decay } => Box::new(
				SgdConfig::new()
					.with_momentum(momentum.map(|m| MomentumConfig::new().with_momentum(m)))
					.with_weight_decay(weight_decay.map(WeightDecayConfig::new))
					.init::<B, M>(),
			),
		}
	}
}

impl fmt::Display for OptimizerConfig {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			OptimizerConfig::Adam {
				beta1,
				beta2,
				epsilon,
				weight_decay,
			} => write!(
				f,
				"Adam(betas=({}, {}), eps={}, weight_decay={})",
				beta1,
				beta2,
				epsilon,
				weight_decay.unwrap_or(0.0)
			),
			OptimizerConfig::Sgd { momentum, weight_decay } => write!(
				f,
				"SGD(momentum={}, weight_decay={})",
				momentum.unwrap_or(0.0),
				weight_decay.unwrap_or(0.0)
			),
		}
	}
}

/// Object-safe view over burn optimizers so the trainer can hold any of them and checkpoint its state.
pub trait TrainableOptimizer<B: AutodiffBackend, M: AutodiffModule<B>>: Send {
	fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M;

	/// Serialized optimizer state (moments, step counts).
	fn state_bytes(&self) -> Result<Vec<u8>>;

	fn restore(self: Box<Self>, bytes: Vec<u8>, device: &B::Device) -> Result<Box<dyn TrainableOptimizer<B, M>>>;
}

impl<B, M, O> TrainableOptimizer<B, M> for O
where
	B: AutodiffBackend,
	M: AutodiffModule<B> + 'static,
	O: Optimizer<M, B> + Send + 'static,
{
	fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
		<O as Optimizer<M, B>>::step(self, lr, module, grads)
	}

	fn state_bytes(&self) -> Result<Vec<u8>> {
		let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
		Ok(Recorder::<B>::record(&recorder, <O as Optimizer<M, B>>::to_record(self), ())?)
	}

	fn restore(self: Box<Self>, bytes: Vec<u8>, device: &B::Device) -> Result<Box<dyn TrainableOptimizer<B, M>>> {
		let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
		let record: <O as Optimizer<M, B>>::Record = Recorder::<B>::load(&recorder, bytes, device)?;
		Ok(Box::new(<O as Optimizer<M, B>>::load_record(*self, record)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_serde_tagging() {
		let json = serde_json::to_string(&OptimizerConfig::sgd()).unwrap();
		assert!(json.starts_with("{\"sgd\":"));
		let back: OptimizerConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(back, OptimizerConfig::sgd());
	}

	#[test]
	fn test_bincode_roundtrip() {
		let config = OptimizerConfig::Adam {
			beta1: 0.8,
			beta2: 0.99,
			epsilon: 1e-6,
			weight_decay: Some(1e-4),
		};
		let bytes = bincode::serialize(&config).unwrap();
		let back: OptimizerConfig = bincode::deserialize(&bytes).unwrap();
		assert_eq!(back, config);
	}

	#[test]
	fn test_display() {
		assert_eq!(
			OptimizerConfig::sgd().to_string(),
			"SGD(momentum=0, weight_decay=0)"
		);
		assert!(OptimizerConfig::adam().to_string().starts_with("Adam(betas=(0.9, 0.999)"));
	}
}
