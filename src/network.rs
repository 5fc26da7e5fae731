use crate::constants::network as defaults;
use crate::error::{Result, TrainError};
use crate::utils::ensure_list;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::optim::GradientsParams;
use burn::tensor::activation::relu;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture of a 2D U-Net. This is what a checkpoint stores to rebuild the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UNetConfig {
	pub in_channels: usize,
	pub out_channels: usize,
	/// Number of down-sampling steps.
	pub nb_levels: usize,
	/// Features per level, the last entry being the bottleneck. Short lists are padded with their last value.
	pub nb_features: Vec<usize>,
	pub kernel_size: usize,
}

impl Default for UNetConfig {
	fn default() -> Self {
		Self {
			in_channels: defaults::DEFAULT_IN_CHANNELS,
			out_channels: defaults::DEFAULT_OUT_CHANNELS,
			nb_levels: defaults::DEFAULT_NB_LEVELS,
			nb_features: defaults::DEFAULT_NB_FEATURES.to_vec(),
			kernel_size: defaults::DEFAULT_KERNEL_SIZE,
		}
	}
}

impl UNetConfig {
	pub fn new(in_channels: usize, out_channels: usize) -> Self {
		Self {
			in_channels,
			out_channels,
			..Self::default()
		}
	}

	pub fn with_nb_levels(mut self, nb_levels: usize) -> Self {
		self.nb_levels = nb_levels;
		self
	}

	pub fn with_nb_features(mut self, nb_features: Vec<usize>) -> Self {
		self.nb_features = nb_features;
		self
	}

	pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
		self.kernel_size = kernel_size;
		self
	}

	/// Feature counts expanded to one entry per level plus the bottleneck.
	pub fn features(&self) -> Vec<usize> {
		ensure_list(&self.nb_features, self.nb_levels + 1)
	}

	/// Spatial sizes must be multiples of this value.
	pub fn size_divisor(&self) -> usize {
		1 << self.nb_levels
	}

	pub fn validate(&self) -> Result<()> {
		if self.in_channels == 0 || self.out_channels == 0 {
			return Err(TrainError::InvalidParameter(
				"Input and output channels must be greater than 0".into(),
			));
		}
		if self.nb_features.is_empty() || self.nb_features.contains(&0) {
			return Err(TrainError::InvalidParameter(format!(
				"Feature counts must be non-empty and positive, got {:?}",
				self.nb_features
			)));
		}
		if self.kernel_size % 2 == 0 {
			return Err(TrainError::InvalidParameter(format!(
				"Kernel size ({}) must be odd",
				self.kernel_size
			)));
		}
		if self.nb_levels > 8 {
			return Err(TrainError::InvalidParameter(format!(
				"Number of levels ({}) must be at most 8",
				self.nb_levels
			)));
		}
		Ok(())
	}

	pub fn init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>> {
		self.validate()?;
		let features = self.features();
		let kernel = self.kernel_size;

		let mut encoders = Vec::with_capacity(self.nb_levels);
		let mut channels = self.in_channels;
		for &f in &features[..self.nb_levels] {
			encoders.push(ConvBlock::new(channels, f, kernel, device));
			channels = f;
		}
		let bottleneck = ConvBlock::new(channels, features[self.nb_levels], kernel, device);

		let mut upsamplers = Vec::with_capacity(self.nb_levels);
		let mut decoders = Vec::with_capacity(self.nb_levels);
		for level in (0..self.nb_levels).rev() {
			upsamplers.push(
				ConvTranspose2dConfig::new([features[level + 1], features[level]], [2, 2])
					.with_stride([2, 2])
					.init(device),
			);
			decoders.push(ConvBlock::new(2 * features[level], features[level], kernel, device));
		}

		let head = Conv2dConfig::new([features[0], self.out_channels], [1, 1]).init(device);

		Ok(UNet {
			encoders,
			pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
			bottleneck,
			upsamplers,
			decoders,
			head,
		})
	}
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
	conv1: Conv2d<B>,
	conv2: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
	fn new(in_channels: usize, out_channels: usize, kernel: usize, device: &B::Device) -> Self {
		let conv = |i, o| {
			Conv2dConfig::new([i, o], [kernel, kernel])
				.with_padding(PaddingConfig2d::Same)
				.init(device)
		};
		Self {
			conv1: conv(in_channels, out_channels),
			conv2: conv(out_channels, out_channels),
		}
	}

	pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
		let x = relu(self.conv1.forward(x));
		relu(self.conv2.forward(x))
	}
}

/// Encoder/decoder with skip connections, producing one logit map per output channel.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
	encoders: Vec<ConvBlock<B>>,
	pool: MaxPool2d,
	bottleneck: ConvBlock<B>,
	/// Deepest level first, as are `decoders`.
	upsamplers: Vec<ConvTranspose2d<B>>,
	decoders: Vec<ConvBlock<B>>,
	head: Conv2d<B>,
}

impl<B: Backend> UNet<B> {
	pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
		let mut skips = Vec::with_capacity(self.encoders.len());
		let mut x = x;
		for encoder in &self.encoders {
			x = encoder.forward(x);
			skips.push(x.clone());
			x = self.pool.forward(x);
		}
		x = self.bottleneck.forward(x);
		for (upsampler, decoder) in self.upsamplers.iter().zip(&self.decoders) {
			x = upsampler.forward(x);
			if let Some(skip) = skips.pop() {
				x = Tensor::cat(vec![skip, x], 1);
			}
			x = decoder.forward(x);
		}
		self.head.forward(x)
	}

	/// Weight and optional bias of every layer, keyed by layer path.
	fn layers(&self) -> Vec<(String, &Param<Tensor<B, 4>>, Option<&Param<Tensor<B, 1>>>)> {
		fn conv<B: Backend>(name: String, layer: &Conv2d<B>) -> (String, &Param<Tensor<B, 4>>, Option<&Param<Tensor<B, 1>>>) {
			(name, &layer.weight, layer.bias.as_ref())
		}

		let mut layers = Vec::new();
		for (i, block) in self.encoders.iter().enumerate() {
			layers.push(conv(format!("encoders.{}.conv1", i), &block.conv1));
			layers.push(conv(format!("encoders.{}.conv2", i), &block.conv2));
		}
		layers.push(conv("bottleneck.conv1".into(), &self.bottleneck.conv1));
		layers.push(conv("bottleneck.conv2".into(), &self.bottleneck.conv2));
		for (i, block) in self.decoders.iter().enumerate() {
			layers.push(conv(format!("decoders.{}.conv1", i), &block.conv1));
			layers.push(conv(format!("decoders.{}.conv2", i), &block.conv2));
		}
		layers.push(conv("head".into(), &self.head));
		for (i, up) in self.upsamplers.iter().enumerate() {
			layers.push((format!("upsamplers.{}", i), &up.weight, up.bias.as_ref()));
		}
		layers
	}

	/// Flattened weights and biases keyed by layer path.
	pub fn parameter_tensors(&self) -> Vec<(String, Vec<f32>)> {
		let mut params = Vec::new();
		for (name, weight, bias) in self.layers() {
			params.push((format!("{}.weight", name), flatten(weight.val())));
			if let Some(bias) = bias {
				params.push((format!("{}.bias", name), flatten(bias.val())));
			}
		}
		params
	}

	/// Flattened gradients of the parameters present in `grads`, keyed like [`UNet::parameter_tensors`].
	pub fn parameter_gradients(&self, grads: &GradientsParams) -> Vec<(String, Vec<f32>)>
	where
		B: AutodiffBackend,
	{
		let mut params = Vec::new();
		for (name, weight, bias) in self.layers() {
			if let Some(grad) = grads.get::<B::InnerBackend, 4>(weight.id) {
				params.push((format!("{}.weight", name), flatten(grad)));
			}
			if let Some(grad) = bias.and_then(|b| grads.get::<B::InnerBackend, 1>(b.id)) {
				params.push((format!("{}.bias", name), flatten(grad)));
			}
		}
		params
	}
}

fn flatten<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
	tensor.into_data().iter::<f32>().collect()
}

/// A U-Net together with the configuration that built it.
#[derive(Debug, Clone)]
pub struct SegmentationNetwork<B: Backend> {
	config: UNetConfig,
	module: UNet<B>,
}

impl<B: Backend> SegmentationNetwork<B> {
	pub fn new(config: UNetConfig, device: &B::Device) -> Result<Self> {
		let module = config.init(device)?;
		Ok(Self { config, module })
	}

	pub(crate) fn from_parts(config: UNetConfig, module: UNet<B>) -> Self {
		Self { config, module }
	}

	pub fn to_device(self, device: &B::Device) -> Self {
		Self {
			config: self.config,
			module: self.module.to_device(device),
		}
	}

	pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
		self.module.forward(x)
	}

	/// Device holding the parameters, or the backend default for a parameterless module.
	pub fn device(&self) -> B::Device {
		self.module.devices().into_iter().next().unwrap_or_default()
	}

	pub fn config(&self) -> &UNetConfig {
		&self.config
	}

	pub fn module(&self) -> &UNet<B> {
		&self.module
	}

	pub(crate) fn set_module(&mut self, module: UNet<B>) {
		self.module = module;
	}

	pub fn num_params(&self) -> usize {
		self.module.num_params()
	}

	pub fn parameter_tensors(&self) -> Vec<(String, Vec<f32>)> {
		self.module.parameter_tensors()
	}

	pub fn parameter_gradients(&self, grads: &GradientsParams) -> Vec<(String, Vec<f32>)>
	where
		B: AutodiffBackend,
	{
		self.module.parameter_gradients(grads)
	}

	pub fn summary(&self) -> NetworkSummary {
		NetworkSummary::new(&self.config, self.num_params())
	}
}

/// Printable layer-by-layer description of a [`SegmentationNetwork`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSummary {
	pub header: String,
	pub layers: Vec<String>,
	pub num_params: usize,
}

impl NetworkSummary {
	fn new(config: &UNetConfig, num_params: usize) -> Self {
		let features = config.features();
		let k = config.kernel_size;
		let mut layers = Vec::new();

		let mut channels = config.in_channels;
		for (level, &f) in features[..config.nb_levels].iter().enumerate() {
			layers.push(format!("encoders.{}: ConvBlock({} -> {}, kernel {}x{}, ReLU)", level, channels, f, k, k));
			layers.push(format!("pool.{}: MaxPool2d(2x2)", level));
			channels = f;
		}
		layers.push(format!(
			"bottleneck: ConvBlock({} -> {}, kernel {}x{}, ReLU)",
			channels, features[config.nb_levels], k, k
		));
		for (i, level) in (0..config.nb_levels).rev().enumerate() {
			layers.push(format!(
				"upsamplers.{}: ConvTranspose2d({} -> {}, kernel 2x2, stride 2)",
				i,
				features[level + 1],
				features[level]
			));
			layers.push(format!(
				"decoders.{}: ConvBlock({} -> {}, kernel {}x{}, ReLU)",
				i,
				2 * features[level],
				features[level],
				k,
				k
			));
		}
		layers.push(format!("head: Conv2d({} -> {}, kernel 1x1)", features[0], config.out_channels));

		Self {
			header: format!(
				"UNet(in_channels={}, out_channels={}, nb_levels={})",
				config.in_channels, config.out_channels, config.nb_levels
			),
			layers,
			num_params,
		}
	}
}

impl fmt::Display for NetworkSummary {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "{}", self.header)?;
		for layer in &self.layers {
			writeln!(f, "  {}", layer)?;
		}
		write!(f, "  parameters: {}", self.num_params)
	}
}
