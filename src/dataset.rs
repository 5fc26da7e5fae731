use crate::constants::dataset as defaults;
use crate::error::{Result, TrainError};
use burn::tensor::backend::Backend;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One supervised pair, both laid out as `[channels, height, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
	pub input: Array3<f32>,
	pub target: Array3<f32>,
}

/// A source of samples living on a compute device.
pub trait Dataset<B: Backend>: Send + Sync {
	fn len(&self) -> usize;

	fn get(&self, index: usize) -> Option<Sample>;

	/// Device the batches built from this dataset are placed on.
	fn device(&self) -> B::Device;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Randomly painted discs over a background, for smoke-testing segmentation pipelines.
///
/// With a class count the target is a one-hot encoding of the label map (class 0 is the
/// background). Without one, every output channel is an independent binary mask.
/// Samples are regenerated on every `get` from `(seed, index)`, so the same index always
/// yields the same pair.
#[derive(Debug, Clone)]
pub struct SyntheticSegmentationDataset<B: Backend> {
	nb_samples: usize,
	input_shape: [usize; 3],
	output_shape: [usize; 3],
	nb_classes: Option<usize>,
	nb_shapes: usize,
	noise: f32,
	seed: u64,
	device: B::Device,
}

impl<B: Backend> SyntheticSegmentationDataset<B> {
	pub fn new(
		nb_samples: usize,
		input_shape: [usize; 3],
		output_shape: [usize; 3],
		nb_classes: Option<usize>,
		device: B::Device,
	) -> Result<Self> {
		if input_shape.iter().any(|&d| d == 0) || output_shape.iter().any(|&d| d == 0) {
			return Err(TrainError::Dataset(format!(
				"Shapes must not contain zero sized dimensions: input {:?}, output {:?}",
				input_shape, output_shape
			)));
		}
		if input_shape[1..] != output_shape[1..] {
			return Err(TrainError::Dataset(format!(
				"Input spatial size {:?} differs from output spatial size {:?}",
				&input_shape[1..],
				&output_shape[1..]
			)));
		}
		if let Some(classes) = nb_classes {
			if classes < 2 {
				return Err(TrainError::Dataset(format!(
					"At least 2 classes are required, got {}",
					classes
				)));
			}
			if output_shape[0] != classes {
				return Err(TrainError::Dataset(format!(
					"Output channels ({}) must equal the number of classes ({})",
					output_shape[0], classes
				)));
			}
		}

		Ok(Self {
			nb_samples,
			input_shape,
			output_shape,
			nb_classes,
			nb_shapes: defaults::DEFAULT_NB_SHAPES,
			noise: defaults::DEFAULT_NOISE,
			seed: defaults::DEFAULT_SEED,
			device,
		})
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = seed;
		self
	}

	pub fn with_nb_shapes(mut self, nb_shapes: usize) -> Self {
		self.nb_shapes = nb_shapes;
		self
	}

	/// Amplitude of the uniform noise added to every input pixel. Must be finite.
	pub fn with_noise(mut self, noise: f32) -> Result<Self> {
		if !noise.is_finite() {
			return Err(TrainError::Dataset(format!("Noise amplitude must be finite, got {}", noise)));
		}
		self.noise = noise.abs();
		Ok(self)
	}

	pub fn input_shape(&self) -> [usize; 3] {
		self.input_shape
	}

	pub fn output_shape(&self) -> [usize; 3] {
		self.output_shape
	}

	pub fn nb_classes(&self) -> Option<usize> {
		self.nb_classes
	}

	fn generate(&self, index: usize) -> Sample {
		let mut rng = StdRng::seed_from_u64(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ index as u64);
		let [in_channels, height, width] = self.input_shape;
		let out_channels = self.output_shape[0];

		// Labels start at 1; 0 is background.
		let nb_labels = self.nb_classes.map(|k| k - 1).unwrap_or(out_channels);
		let mut masks: Vec<Array2<bool>> = vec![Array2::from_elem((height, width), false); nb_labels];
		let mut label_map = Array2::<usize>::zeros((height, width));

		let max_radius = (height.min(width) as f32 / 4.0).max(1.0);
		for _ in 0..self.nb_shapes {
			let label = rng.gen_range(1..=nb_labels);
			let cy = rng.gen_range(0.0..height as f32);
			let cx = rng.gen_range(0.0..width as f32);
			let radius = rng.gen_range(0.5..=max_radius);
			for y in 0..height {
				for x in 0..width {
					let dy = y as f32 + 0.5 - cy;
					let dx = x as f32 + 0.5 - cx;
					if dy * dy + dx * dx <= radius * radius {
						label_map[[y, x]] = label;
						masks[label - 1][[y, x]] = true;
					}
				}
			}
		}

		let mut input = Array3::<f32>::zeros((in_channels, height, width));
		for c in 0..in_channels {
			for y in 0..height {
				for x in 0..width {
					let intensity = match self.nb_classes {
						Some(_) => label_map[[y, x]] as f32 / nb_labels as f32,
						None => masks.iter().filter(|m| m[[y, x]]).count() as f32 / nb_labels as f32,
					};
					// Scaled from [-1, 1) so large amplitudes cannot overflow the sampled range.
					let noise = if self.noise > 0.0 {
						self.noise * rng.gen_range(-1.0f32..1.0)
					} else {
						0.0
					};
					input[[c, y, x]] = intensity + noise;
				}
			}
		}

		let mut target = Array3::<f32>::zeros((out_channels, height, width));
		for y in 0..height {
			for x in 0..width {
				match self.nb_classes {
					Some(_) => target[[label_map[[y, x]], y, x]] = 1.0,
					None => {
						for (c, mask) in masks.iter().enumerate() {
							if mask[[y, x]] {
								target[[c, y, x]] = 1.0;
							}
						}
					}
				}
			}
		}

		Sample { input, target }
	}
}

impl<B: Backend> Dataset<B> for SyntheticSegmentationDataset<B> {
	fn len(&self) -> usize {
		self.nb_samples
	}

	fn get(&self, index: usize) -> Option<Sample> {
		if index >= self.nb_samples {
			return None;
		}
		Some(self.generate(index))
	}

	fn device(&self) -> B::Device {
		self.device.clone()
	}
}
