use crate::constants::optimizer::DICE_SMOOTH;
use crate::error::{Result, TrainError};
use burn::tensor::activation::{log_softmax, sigmoid, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
	Dice,
	CrossEntropy,
	Mse,
}

impl LossKind {
	pub fn from_str(s: &str) -> Result<Self> {
		match s.to_lowercase().as_str() {
			"dice" => Ok(LossKind::Dice),
			"cross_entropy" | "ce" => Ok(LossKind::CrossEntropy),
			"mse" | "l2" => Ok(LossKind::Mse),
			_ => Err(TrainError::InvalidParameter(format!("Unknown loss: {}", s))),
		}
	}
}

/// How logits are turned into probabilities: softmax for exclusive classes, sigmoid for independent masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
	Softmax,
	Sigmoid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationLoss {
	pub kind: LossKind,
	pub activation: OutputActivation,
	/// Added to both sides of the Dice ratio.
	pub smooth: f64,
}

impl Default for SegmentationLoss {
	fn default() -> Self {
		Self::new(LossKind::Dice)
	}
}

impl SegmentationLoss {
	pub fn new(kind: LossKind) -> Self {
		Self {
			kind,
			activation: OutputActivation::Softmax,
			smooth: DICE_SMOOTH,
		}
	}

	pub fn dice() -> Self {
		Self::new(LossKind::Dice)
	}

	pub fn cross_entropy() -> Self {
		Self::new(LossKind::CrossEntropy)
	}

	pub fn mse() -> Self {
		Self::new(LossKind::Mse)
	}

	pub fn with_activation(mut self, activation: OutputActivation) -> Self {
		self.activation = activation;
		self
	}

	pub fn with_smooth(mut self, smooth: f64) -> Self {
		self.smooth = smooth;
		self
	}

	/// Mean loss over the batch. Both tensors are `[batch, channels, height, width]`.
	pub fn forward<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
		match self.kind {
			LossKind::Dice => self.dice_loss(logits, targets),
			LossKind::CrossEntropy => self.cross_entropy_loss(logits, targets),
			LossKind::Mse => {
				let diff = self.activate(logits) - targets;
				(diff.clone() * diff).mean()
			}
		}
	}

	fn activate<B: Backend>(&self, logits: Tensor<B, 4>) -> Tensor<B, 4> {
		match self.activation {
			OutputActivation::Softmax => softmax(logits, 1),
			OutputActivation::Sigmoid => sigmoid(logits),
		}
	}

	fn dice_loss<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
		let probs = self.activate(logits);
		let per_channel = |t: Tensor<B, 4>| t.sum_dim(3).sum_dim(2).sum_dim(0);

		let intersection = per_channel(probs.clone() * targets.clone());
		let denominator = per_channel(probs) + per_channel(targets);
		let dice = intersection
			.mul_scalar(2.0)
			.add_scalar(self.smooth)
			.div(denominator.add_scalar(self.smooth));

		dice.mean().neg().add_scalar(1.0)
	}

	fn cross_entropy_loss<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
		match self.activation {
			OutputActivation::Softmax => {
				let [batch, _, height, width] = logits.dims();
				let nll = (log_softmax(logits, 1) * targets).sum().neg();
				nll.div_scalar((batch * height * width) as f64)
			}
			OutputActivation::Sigmoid => {
				// max(x, 0) - x * t + log(1 + exp(-|x|))
				let positive = logits.clone().clamp_min(0.0);
				let softplus = logits.clone().abs().neg().exp().add_scalar(1.0).log();
				(positive - logits * targets + softplus).mean()
			}
		}
	}
}

impl fmt::Display for SegmentationLoss {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}Loss(activation={:?}", self.kind, self.activation)?;
		if self.kind == LossKind::Dice {
			write!(f, ", smooth={}", self.smooth)?;
		}
		write!(f, ")")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use burn::backend::NdArray;
	use burn::tensor::{ElementConversion, TensorData};

	type TestBackend = NdArray;

	fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
		t.into_scalar().elem::<f64>()
	}

	/// Two pixels, two classes: the first pixel is class 0, the second class 1.
	fn targets() -> Tensor<TestBackend, 4> {
		Tensor::from_data(TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0], [1, 2, 1, 2]), &Default::default())
	}

	fn logits(confidence: f32) -> Tensor<TestBackend, 4> {
		let c = confidence;
		Tensor::from_data(TensorData::new(vec![c, -c, -c, c], [1, 2, 1, 2]), &Default::default())
	}

	#[test]
	fn test_dice_is_low_for_confident_correct_prediction() {
		let loss = SegmentationLoss::dice();
		let good = scalar(loss.forward(logits(10.0), targets()));
		let bad = scalar(loss.forward(logits(-10.0), targets()));
		assert!(good < 0.01, "good = {}", good);
		assert!(bad > 0.99, "bad = {}", bad);
	}

	#[test]
	fn test_cross_entropy_matches_closed_form() {
		// Uniform logits give ln(2) per pixel.
		let loss = SegmentationLoss::cross_entropy();
		let value = scalar(loss.forward(logits(0.0), targets()));
		assert!((value - std::f64::consts::LN_2).abs() < 1e-5, "value = {}", value);
	}

	#[test]
	fn test_sigmoid_cross_entropy_matches_closed_form() {
		let loss = SegmentationLoss::cross_entropy().with_activation(OutputActivation::Sigmoid);
		let value = scalar(loss.forward(logits(0.0), targets()));
		assert!((value - std::f64::consts::LN_2).abs() < 1e-5, "value = {}", value);
	}

	#[test]
	fn test_mse_is_zero_for_exact_probabilities() {
		let loss = SegmentationLoss::mse().with_activation(OutputActivation::Sigmoid);
		let value = scalar(loss.forward(logits(30.0), targets()));
		assert!(value < 1e-6, "value = {}", value);
	}

	#[test]
	fn test_parse_kind() {
		assert_eq!(LossKind::from_str("Dice").unwrap(), LossKind::Dice);
		assert_eq!(LossKind::from_str("ce").unwrap(), LossKind::CrossEntropy);
		assert!(LossKind::from_str("hinge").is_err());
	}
}
