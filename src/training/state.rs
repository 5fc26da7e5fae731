use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Progress counters and running losses of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingState {
	pub current_epoch: usize,
	pub current_step: usize,
	pub epoch_train_loss: f64,
	pub epoch_eval_loss: f64,
	#[serde(serialize_with = "serialize_loss", deserialize_with = "deserialize_loss")]
	pub best_eval_loss: f64,
	pub epochs_without_improvement: usize,
}

impl Default for TrainingState {
	fn default() -> Self {
		Self {
			current_epoch: 0,
			current_step: 0,
			epoch_train_loss: 0.0,
			epoch_eval_loss: 0.0,
			best_eval_loss: f64::INFINITY,
			epochs_without_improvement: 0,
		}
	}
}

impl TrainingState {
	/// Records an eval loss and returns whether it beats the best one seen so far.
	pub fn record_eval(&mut self, loss: f64) -> bool {
		self.epoch_eval_loss = loss;
		if loss < self.best_eval_loss {
			self.best_eval_loss = loss;
			self.epochs_without_improvement = 0;
			true
		} else {
			self.epochs_without_improvement += 1;
			false
		}
	}

	/// A reloaded run is not expected to beat the loss of the run it came from.
	pub fn reset_for_fine_tuning(&mut self) {
		self.best_eval_loss = f64::INFINITY;
		self.epochs_without_improvement = 0;
	}

	pub fn should_stop(&self, patience: usize) -> bool {
		patience > 0 && self.epochs_without_improvement >= patience
	}
}

impl fmt::Display for TrainingState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"TrainingState(epoch={}, step={}, train_loss={:.6}, eval_loss={:.6}, best_eval_loss={:.6})",
			self.current_epoch, self.current_step, self.epoch_train_loss, self.epoch_eval_loss, self.best_eval_loss
		)
	}
}

// JSON has no infinity; a missing best loss is written as null.
fn serialize_loss<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
	if value.is_finite() {
		serializer.serialize_some(value)
	} else {
		serializer.serialize_none()
	}
}

fn deserialize_loss<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
	Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}
