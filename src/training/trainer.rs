use crate::config::TrainerConfig;
use crate::constants::trainer::{EVAL_BATCH_SIZE, SPLIT_SEED};
use crate::dataset::Dataset;
use crate::error::{Result, TrainError};
use crate::loss::SegmentationLoss;
use crate::network::{SegmentationNetwork, UNet};
use crate::optim::{OptimizerConfig, TrainableOptimizer};
use crate::training::checkpoint::{resolve_checkpoint, CheckpointFile, CheckpointKind, CheckpointManager};
use crate::training::data_loader::{split_indices, Batch, DataLoader};
use crate::training::metrics::{MetricsWriter, Timestep};
use crate::training::state::TrainingState;
use crate::utils::refresh_experiment_dir;
use burn::module::{AutodiffModule, Module};
use burn::optim::GradientsParams;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;

type ModelRecord<B> = <UNet<B> as Module<B>>::Record;

/// Supervised training loop for a [`SegmentationNetwork`], with evaluation,
/// early stopping, metrics and `best`/`last` checkpoints.
pub struct SupervisedTrainer<B: AutodiffBackend> {
	network: SegmentationNetwork<B>,
	optimizer: Box<dyn TrainableOptimizer<B, UNet<B>>>,
	optimizer_config: OptimizerConfig,
	loss: SegmentationLoss,
	config: TrainerConfig,
	state: TrainingState,
	device: B::Device,
	train_loader: Option<DataLoader<B>>,
	eval_loader: Option<DataLoader<B>>,
	writer: Option<MetricsWriter>,
	/// Gradients of the last training step of an epoch, kept for histograms at verbosity 2.
	last_gradients: Vec<(String, Vec<f32>)>,
}

impl<B: AutodiffBackend> SupervisedTrainer<B> {
	pub fn new(
		network: SegmentationNetwork<B>,
		optimizer_config: OptimizerConfig,
		loss: SegmentationLoss,
		dataset: Option<Arc<dyn Dataset<B>>>,
		config: TrainerConfig,
	) -> Result<Self> {
		config.validate()?;
		let device = network.device();
		let optimizer = optimizer_config.init::<B, UNet<B>>();

		let mut trainer = Self {
			network,
			optimizer,
			optimizer_config,
			loss,
			config,
			state: TrainingState::default(),
			device,
			train_loader: None,
			eval_loader: None,
			writer: None,
			last_gradients: Vec::new(),
		};
		if let Some(dataset) = dataset {
			trainer.prepare_loaders(dataset)?;
		}
		Ok(trainer)
	}

	/// Splits `dataset` into a shuffled train loader and a sequential eval loader of batch size 1.
	pub fn prepare_loaders(&mut self, dataset: Arc<dyn Dataset<B>>) -> Result<()> {
		if dataset.is_empty() {
			return Err(TrainError::Training("Cannot train on an empty dataset".into()));
		}
		self.check_sample_shapes(dataset.as_ref())?;
		let (train, eval) = split_indices(dataset.len(), self.config.train_to_val, SPLIT_SEED);
		if train.is_empty() {
			return Err(TrainError::Training(format!(
				"A train/validation ratio of {} leaves no training samples out of {}",
				self.config.train_to_val,
				dataset.len()
			)));
		}
		info!(
			"Prepared loaders: {} training and {} evaluation samples",
			train.len(),
			eval.len()
		);

		let workers = self.config.num_workers;
		self.eval_loader = if eval.is_empty() {
			None
		} else {
			Some(DataLoader::new(dataset.clone(), eval, EVAL_BATCH_SIZE, false, SPLIT_SEED, workers)?)
		};
		self.train_loader = Some(DataLoader::new(
			dataset,
			train,
			self.config.batch_size,
			true,
			SPLIT_SEED,
			workers,
		)?);
		Ok(())
	}

	/// Rejects datasets whose samples the network cannot consume, before any tensor is built.
	fn check_sample_shapes(&self, dataset: &dyn Dataset<B>) -> Result<()> {
		let sample = dataset
			.get(0)
			.ok_or_else(|| TrainError::Dataset("Dataset returned no sample at index 0".into()))?;
		let input = sample.input.shape();
		let target = sample.target.shape();
		let network = self.network.config();
		let divisor = network.size_divisor();

		if input[0] != network.in_channels {
			return Err(TrainError::Dataset(format!(
				"Samples have {} input channels, the network expects {}",
				input[0], network.in_channels
			)));
		}
		if target[0] != network.out_channels {
			return Err(TrainError::Dataset(format!(
				"Targets have {} channels, the network outputs {}",
				target[0], network.out_channels
			)));
		}
		if input[1..] != target[1..] {
			return Err(TrainError::Dataset(format!(
				"Input size {:?} differs from target size {:?}",
				&input[1..],
				&target[1..]
			)));
		}
		if input[1..].iter().any(|size| size % divisor != 0) {
			return Err(TrainError::Dataset(format!(
				"Sample size {:?} must be divisible by {} for a network with {} levels",
				&input[1..],
				divisor,
				network.nb_levels
			)));
		}
		Ok(())
	}

	pub fn train(&mut self) -> Result<()> {
		if self.train_loader.is_none() {
			return Err(TrainError::Training(
				"No data loaders attached, call prepare_loaders first".into(),
			));
		}
		self.config.validate()?;

		let dir = self.config.experiment_dir.clone();
		if self.config.refresh_experiment_dir {
			info!("Refreshing experiment directory {}", dir.display());
			refresh_experiment_dir(&dir)?;
		} else {
			fs::create_dir_all(&dir)?;
		}
		self.open_writer()?;

		info!(
			"Training for {} epochs from epoch {} (lr {}, batch size {})",
			self.config.nb_epochs, self.state.current_epoch, self.config.lr, self.config.batch_size
		);
		for _ in 0..self.config.nb_epochs {
			self.train_epoch()?;
			if self.eval_loader.is_some() {
				self.eval_epoch()?;
			} else {
				self.save_checkpoint(CheckpointKind::Last)?;
			}
			info!("{}", self.state);

			if self.state.should_stop(self.config.early_stopping) {
				info!(
					"Early stopping after {} epochs without improvement",
					self.state.epochs_without_improvement
				);
				break;
			}
		}

		if let Some(writer) = self.writer.as_mut() {
			writer.flush()?;
		}
		Ok(())
	}

	/// One pass over the training loader. Advances `current_epoch`.
	pub fn train_epoch(&mut self) -> Result<()> {
		let loader = self
			.train_loader
			.take()
			.ok_or_else(|| TrainError::Training("No training loader attached".into()))?;
		let result = self.run_train_epoch(&loader);
		self.train_loader = Some(loader);
		result
	}

	fn run_train_epoch(&mut self, loader: &DataLoader<B>) -> Result<()> {
		let epoch = self.state.current_epoch;
		let progress = self.progress_bar(loader.len(), format!("train {}", epoch + 1));

		self.state.epoch_train_loss = 0.0;
		let mut nb_batches = 0;
		let keep_gradients = self.config.logging_verbosity >= 2;
		for batch in loader.iter(epoch) {
			let last = nb_batches + 1 == loader.len();
			self.step(batch?, keep_gradients && last)?;
			nb_batches += 1;
			progress.inc(1);
		}
		progress.finish_and_clear();

		if nb_batches > 0 {
			self.state.epoch_train_loss /= nb_batches as f64;
		}
		self.state.current_epoch += 1;

		self.log_metric("train_epoch_loss", self.state.epoch_train_loss, Timestep::Epoch)?;
		if self.config.logging_verbosity >= 2 {
			self.log_parameters()?;
		}
		Ok(())
	}

	/// Forward, backward and one optimizer update. Returns the batch loss.
	pub fn train_step(&mut self, batch: Batch<B>) -> Result<f64> {
		self.step(batch, false)
	}

	fn step(&mut self, batch: Batch<B>, keep_gradients: bool) -> Result<f64> {
		let logits = self.network.forward(batch.inputs);
		let loss = self.loss.forward(logits, batch.targets);
		let value = loss.clone().into_scalar().elem::<f64>();
		if !value.is_finite() {
			return Err(TrainError::Training(format!(
				"Loss diverged at step {}: {}",
				self.state.current_step, value
			)));
		}

		let grads = GradientsParams::from_grads(loss.backward(), self.network.module());
		if keep_gradients {
			self.last_gradients = self.network.parameter_gradients(&grads);
		}
		let module = self.optimizer.step(self.config.lr, self.network.module().clone(), grads);
		self.network.set_module(module);

		self.state.epoch_train_loss += value;
		self.state.current_step += 1;
		self.log_metric("train_loss", value, Timestep::Step)?;
		Ok(value)
	}

	/// Gradient-free pass over the eval loader. Saves `best` on improvement and `last` always.
	pub fn eval_epoch(&mut self) -> Result<()> {
		let loader = self
			.eval_loader
			.take()
			.ok_or_else(|| TrainError::Training("No evaluation loader attached".into()))?;
		let result = self.run_eval_epoch(&loader);
		self.eval_loader = Some(loader);
		result
	}

	fn run_eval_epoch(&mut self, loader: &DataLoader<B>) -> Result<()> {
		let model = self.network.module().valid();
		let progress = self.progress_bar(loader.len(), format!("eval {}", self.state.current_epoch));

		let mut total = 0.0;
		let mut nb_batches = 0;
		for batch in loader.iter(self.state.current_epoch) {
			let batch = batch?;
			let logits = model.forward(batch.inputs.inner());
			total += self.loss.forward(logits, batch.targets.inner()).into_scalar().elem::<f64>();
			nb_batches += 1;
			progress.inc(1);
		}
		progress.finish_and_clear();

		let mean = if nb_batches > 0 { total / nb_batches as f64 } else { 0.0 };
		let improved = self.state.record_eval(mean);
		self.log_metric("eval_epoch_loss", mean, Timestep::Epoch)?;

		if improved {
			info!("New best eval loss {:.6}", mean);
			self.save_checkpoint(CheckpointKind::Best)?;
		}
		self.save_checkpoint(CheckpointKind::Last)
	}

	/// Writes a full checkpoint to `path`, creating parent directories.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let path = path.as_ref();
		self.checkpoint_file()?.write(path)?;
		info!("Saved checkpoint to {}", path.display());
		Ok(())
	}

	/// Rebuilds a trainer from an experiment directory or a `.ckpt` file.
	///
	/// The best eval loss is reset so the reloaded run saves its own `best` checkpoint,
	/// and no loaders are attached.
	pub fn load<P: AsRef<Path>>(source: P, kind: CheckpointKind, device: &B::Device) -> Result<Self> {
		let path = resolve_checkpoint(source, kind)?;
		info!("Loading checkpoint {}", path.display());
		let file = CheckpointFile::read(&path)?;

		let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
		let record: ModelRecord<B> = Recorder::<B>::load(&recorder, file.model_record, device)?;
		let module = file.network.init::<B>(device)?.load_record(record);
		let network = SegmentationNetwork::from_parts(file.network, module);

		let mut optimizer = file.optimizer.init::<B, UNet<B>>();
		if let Some(bytes) = file.optimizer_record {
			optimizer = optimizer.restore(bytes, device)?;
		}

		let mut state = file.state;
		state.reset_for_fine_tuning();
		let mut config = file.trainer;
		config.refresh_experiment_dir = false;
		debug!("Restored {}", state);

		Ok(Self {
			network,
			optimizer,
			optimizer_config: file.optimizer,
			loss: file.loss,
			config,
			state,
			device: device.clone(),
			train_loader: None,
			eval_loader: None,
			writer: None,
			last_gradients: Vec::new(),
		})
	}

	/// Logs a scalar against the step or epoch counter. No-op below verbosity 1.
	pub fn log_metric(&mut self, tag: &str, value: f64, timestep: Timestep) -> Result<()> {
		let step = match timestep {
			Timestep::Step => self.state.current_step,
			Timestep::Epoch => self.state.current_epoch,
		};
		match self.writer.as_mut() {
			Some(writer) if self.config.logging_verbosity >= 1 => writer.add_scalar(tag, value, step),
			_ => Ok(()),
		}
	}

	pub fn config(&self) -> &TrainerConfig {
		&self.config
	}

	pub fn config_mut(&mut self) -> &mut TrainerConfig {
		&mut self.config
	}

	pub fn state(&self) -> &TrainingState {
		&self.state
	}

	pub fn network(&self) -> &SegmentationNetwork<B> {
		&self.network
	}

	pub fn loss(&self) -> &SegmentationLoss {
		&self.loss
	}

	pub fn optimizer_config(&self) -> &OptimizerConfig {
		&self.optimizer_config
	}

	pub fn device(&self) -> &B::Device {
		&self.device
	}

	pub fn has_loaders(&self) -> bool {
		self.train_loader.is_some()
	}

	fn open_writer(&mut self) -> Result<()> {
		if self.config.logging_verbosity == 0 {
			self.writer = None;
			return Ok(());
		}
		let writer = MetricsWriter::new(&self.config.experiment_dir)?;
		if self.config.logging_verbosity >= 2 {
			writer.write_model_summary(&self.network.summary())?;
		}
		self.writer = Some(writer);
		Ok(())
	}

	/// Histograms of every parameter (`{name}`) and of its last gradient (`{name}.grad`).
	fn log_parameters(&mut self) -> Result<()> {
		let step = self.state.current_epoch;
		let gradients = std::mem::take(&mut self.last_gradients);
		if let Some(writer) = self.writer.as_mut() {
			for (name, values) in self.network.parameter_tensors() {
				writer.add_histogram(&name, &values, step)?;
			}
			for (name, values) in gradients {
				writer.add_histogram(&format!("{}.grad", name), &values, step)?;
			}
		}
		Ok(())
	}

	fn checkpoint_file(&self) -> Result<CheckpointFile> {
		let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
		let model_record = Recorder::<B>::record(&recorder, self.network.module().clone().into_record(), ())?;
		Ok(CheckpointFile::new(
			self.config.clone(),
			self.state.clone(),
			self.network.config().clone(),
			self.loss.clone(),
			self.optimizer_config.clone(),
			model_record,
			Some(self.optimizer.state_bytes()?),
		))
	}

	fn save_checkpoint(&self, kind: CheckpointKind) -> Result<()> {
		let file = self.checkpoint_file()?;
		CheckpointManager::new(self.config.checkpoint_dir()).save(kind, self.state.current_epoch, &file)?;
		Ok(())
	}

	fn progress_bar(&self, len: usize, message: String) -> ProgressBar {
		if self.config.logging_verbosity == 0 {
			return ProgressBar::hidden();
		}
		let progress = ProgressBar::new(len as u64);
		progress.set_style(
			ProgressStyle::default_bar()
				.template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})")
				.unwrap_or_else(|_| ProgressStyle::default_bar())
				.progress_chars("=>-"),
		);
		progress.set_message(message);
		progress
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::SyntheticSegmentationDataset;
	use crate::network::UNetConfig;
	use burn::backend::{Autodiff, NdArray};
	use tempfile::TempDir;

	type TestBackend = Autodiff<NdArray>;

	fn trainer(dir: &Path, nb_samples: usize, config: TrainerConfig) -> SupervisedTrainer<TestBackend> {
		let device = Default::default();
		let network = SegmentationNetwork::new(
			UNetConfig::new(1, 2).with_nb_levels(1).with_nb_features(vec![2, 4]),
			&device,
		)
		.unwrap();
		let dataset =
			SyntheticSegmentationDataset::<TestBackend>::new(nb_samples, [1, 8, 8], [2, 8, 8], Some(2), device)
				.unwrap();
		let dataset: Arc<dyn Dataset<TestBackend>> = Arc::new(dataset);
		let config = TrainerConfig {
			experiment_dir: dir.to_path_buf(),
			..config
		};
		SupervisedTrainer::new(
			network,
			OptimizerConfig::adam(),
			SegmentationLoss::dice(),
			Some(dataset),
			config,
		)
		.unwrap()
	}

	#[test]
	fn test_train_without_loaders_fails() {
		let dir = TempDir::new().unwrap();
		let device = Default::default();
		let network = SegmentationNetwork::<TestBackend>::new(UNetConfig::default(), &device).unwrap();
		let mut trainer = SupervisedTrainer::new(
			network,
			OptimizerConfig::sgd(),
			SegmentationLoss::mse(),
			None,
			TrainerConfig::new(dir.path()),
		)
		.unwrap();
		assert!(!trainer.has_loaders());
		assert!(matches!(trainer.train(), Err(TrainError::Training(_))));
	}

	#[test]
	fn test_epoch_counters_advance() {
		let dir = TempDir::new().unwrap();
		let config = TrainerConfig::builder("unused").nb_epochs(2).batch_size(2).logging_verbosity(0).build();
		let mut trainer = trainer(dir.path(), 6, config);
		trainer.train().unwrap();

		// 6 samples at 0.8 leaves 5 for training: 3 batches per epoch.
		assert_eq!(trainer.state().current_epoch, 2);
		assert_eq!(trainer.state().current_step, 6);
		assert!(trainer.state().best_eval_loss.is_finite());
		assert!(!dir.path().join("metrics.jsonl").exists());
	}

	#[test]
	fn test_verbose_training_writes_metrics_and_summary() {
		let dir = TempDir::new().unwrap();
		let config = TrainerConfig::builder("unused").nb_epochs(1).logging_verbosity(2).build();
		let mut trainer = trainer(dir.path(), 4, config);
		trainer.train().unwrap();

		let metrics = fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
		assert!(metrics.contains("\"train_loss\""));
		assert!(metrics.contains("\"train_epoch_loss\""));
		assert!(metrics.contains("\"eval_epoch_loss\""));
		assert!(metrics.contains("\"head.weight\""));
		assert!(metrics.contains("\"head.weight.grad\""));
		assert!(metrics.contains("\"encoders.0.conv1.bias.grad\""));
		assert!(dir.path().join("model.txt").exists());
	}

	#[test]
	fn test_empty_dataset_is_rejected() {
		let dir = TempDir::new().unwrap();
		let device = Default::default();
		let network = SegmentationNetwork::<TestBackend>::new(UNetConfig::default(), &device).unwrap();
		let dataset: Arc<dyn Dataset<TestBackend>> = Arc::new(
			SyntheticSegmentationDataset::<TestBackend>::new(0, [1, 8, 8], [2, 8, 8], Some(2), device).unwrap(),
		);
		let result = SupervisedTrainer::new(
			network,
			OptimizerConfig::adam(),
			SegmentationLoss::dice(),
			Some(dataset),
			TrainerConfig::new(dir.path()),
		);
		assert!(matches!(result, Err(TrainError::Training(_))));
	}

	#[test]
	fn test_mismatched_dataset_shapes_are_rejected() {
		let dir = TempDir::new().unwrap();
		let device = Default::default();
		let config = UNetConfig::new(1, 2).with_nb_levels(2).with_nb_features(vec![2, 4, 8]);
		let build = |input: [usize; 3], output: [usize; 3]| {
			let network = SegmentationNetwork::<TestBackend>::new(config.clone(), &device).unwrap();
			let dataset: Arc<dyn Dataset<TestBackend>> = Arc::new(
				SyntheticSegmentationDataset::<TestBackend>::new(4, input, output, None, device.clone()).unwrap(),
			);
			SupervisedTrainer::new(
				network,
				OptimizerConfig::adam(),
				SegmentationLoss::dice(),
				Some(dataset),
				TrainerConfig::new(dir.path()),
			)
		};

		// 10 is not divisible by 2^2: the decoder could not concatenate its skips.
		assert!(matches!(build([1, 10, 10], [2, 10, 10]), Err(TrainError::Dataset(_))));
		assert!(matches!(build([3, 8, 8], [2, 8, 8]), Err(TrainError::Dataset(_))));
		assert!(matches!(build([1, 8, 8], [3, 8, 8]), Err(TrainError::Dataset(_))));
		assert!(build([1, 8, 12], [2, 8, 12]).is_ok());
	}
}
