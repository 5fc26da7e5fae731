use crate::dataset::{Dataset, Sample};
use crate::error::{Result, TrainError};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Arc;

/// Inputs and targets of a minibatch, laid out as `[batch, channels, height, width]`.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
	pub inputs: Tensor<B, 4>,
	pub targets: Tensor<B, 4>,
}

/// Shuffles `0..len` with `seed` and splits it into `(train, eval)` at `round(len * train_to_val)`.
pub fn split_indices(len: usize, train_to_val: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
	let mut indices: Vec<usize> = (0..len).collect();
	indices.shuffle(&mut StdRng::seed_from_u64(seed));
	let train_size = ((len as f64 * train_to_val).round() as usize).min(len);
	let eval = indices.split_off(train_size);
	(indices, eval)
}

pub struct DataLoader<B: Backend> {
	dataset: Arc<dyn Dataset<B>>,
	indices: Vec<usize>,
	batch_size: usize,
	shuffle: bool,
	seed: u64,
	pool: Option<Arc<rayon::ThreadPool>>,
}

impl<B: Backend> DataLoader<B> {
	pub fn new(
		dataset: Arc<dyn Dataset<B>>,
		indices: Vec<usize>,
		batch_size: usize,
		shuffle: bool,
		seed: u64,
		num_workers: usize,
	) -> Result<Self> {
		if batch_size == 0 {
			return Err(TrainError::InvalidParameter("Batch size must be greater than 0".into()));
		}
		if let Some(&bad) = indices.iter().find(|&&i| i >= dataset.len()) {
			return Err(TrainError::Dataset(format!(
				"Index {} is out of range for a dataset of {} samples",
				bad,
				dataset.len()
			)));
		}
		let pool = if num_workers > 0 {
			let pool = rayon::ThreadPoolBuilder::new()
				.num_threads(num_workers)
				.build()
				.map_err(|e| TrainError::Training(format!("Could not start data workers: {}", e)))?;
			Some(Arc::new(pool))
		} else {
			None
		};

		Ok(Self {
			dataset,
			indices,
			batch_size,
			shuffle,
			seed,
			pool,
		})
	}

	/// Number of batches per epoch.
	pub fn len(&self) -> usize {
		(self.indices.len() + self.batch_size - 1) / self.batch_size
	}

	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	pub fn nb_samples(&self) -> usize {
		self.indices.len()
	}

	pub fn batch_size(&self) -> usize {
		self.batch_size
	}

	/// Iterates the batches of one epoch. Shuffled loaders reseed from `(seed, epoch)`.
	pub fn iter(&self, epoch: usize) -> BatchIter<'_, B> {
		let mut order = self.indices.clone();
		if self.shuffle {
			order.shuffle(&mut StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64)));
		}
		BatchIter {
			loader: self,
			order,
			position: 0,
		}
	}

	fn load_batch(&self, indices: &[usize]) -> Result<Batch<B>> {
		let fetch = |&index: &usize| {
			self.dataset
				.get(index)
				.ok_or_else(|| TrainError::Dataset(format!("Sample {} is missing", index)))
		};
		let samples: Vec<Sample> = match &self.pool {
			Some(pool) => pool.install(|| indices.par_iter().map(fetch).collect::<Result<Vec<_>>>())?,
			None => indices.iter().map(fetch).collect::<Result<Vec<_>>>()?,
		};
		stack_samples(&samples, &self.dataset.device())
	}
}

pub struct BatchIter<'a, B: Backend> {
	loader: &'a DataLoader<B>,
	order: Vec<usize>,
	position: usize,
}

impl<'a, B: Backend> Iterator for BatchIter<'a, B> {
	type Item = Result<Batch<B>>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.position >= self.order.len() {
			return None;
		}
		let end = (self.position + self.loader.batch_size).min(self.order.len());
		let batch = self.loader.load_batch(&self.order[self.position..end]);
		self.position = end;
		Some(batch)
	}
}

fn stack_samples<B: Backend>(samples: &[Sample], device: &B::Device) -> Result<Batch<B>> {
	let first = samples
		.first()
		.ok_or_else(|| TrainError::Dataset("Cannot build an empty batch".into()))?;
	let input_shape = first.input.shape().to_vec();
	let target_shape = first.target.shape().to_vec();

	let mut inputs = Vec::with_capacity(samples.len() * first.input.len());
	let mut targets = Vec::with_capacity(samples.len() * first.target.len());
	for sample in samples {
		if sample.input.shape() != input_shape.as_slice() || sample.target.shape() != target_shape.as_slice() {
			return Err(TrainError::Dataset(format!(
				"Samples of a batch must share shapes: {:?}/{:?} vs {:?}/{:?}",
				input_shape,
				target_shape,
				sample.input.shape(),
				sample.target.shape()
			)));
		}
		inputs.extend(sample.input.iter().copied());
		targets.extend(sample.target.iter().copied());
	}

	let n = samples.len();
	let inputs = Tensor::<B, 4>::from_data(
		TensorData::new(inputs, [n, input_shape[0], input_shape[1], input_shape[2]]),
		device,
	);
	let targets = Tensor::<B, 4>::from_data(
		TensorData::new(targets, [n, target_shape[0], target_shape[1], target_shape[2]]),
		device,
	);
	Ok(Batch { inputs, targets })
}
