pub mod trainer {
	pub const DEFAULT_EXPERIMENT_DIR: &str = "experiments/default";
	pub const DEFAULT_NB_EPOCHS: usize = 100;
	pub const DEFAULT_BATCH_SIZE: usize = 1;
	pub const DEFAULT_LEARNING_RATE: f64 = 1e-4;
	pub const DEFAULT_LOGGING_VERBOSITY: u8 = 1;
	pub const MAX_LOGGING_VERBOSITY: u8 = 2;
	pub const DEFAULT_EARLY_STOPPING: usize = 0;
	pub const DEFAULT_TRAIN_TO_VAL: f64 = 0.8;
	pub const DEFAULT_NUM_WORKERS: usize = 0;
	pub const SPLIT_SEED: u64 = 42;
	pub const EVAL_BATCH_SIZE: usize = 1;
}

pub mod network {
	pub const DEFAULT_IN_CHANNELS: usize = 1;
	pub const DEFAULT_OUT_CHANNELS: usize = 2;
	pub const DEFAULT_NB_LEVELS: usize = 2;
	pub const DEFAULT_NB_FEATURES: [usize; 3] = [16, 32, 64];
	pub const DEFAULT_KERNEL_SIZE: usize = 3;
}

pub mod dataset {
	pub const DEFAULT_NB_SAMPLES: usize = 32;
	pub const DEFAULT_SHAPE: [usize; 2] = [32, 32];
	pub const DEFAULT_NB_SHAPES: usize = 3;
	pub const DEFAULT_NOISE: f32 = 0.1;
	pub const DEFAULT_SEED: u64 = 0;
}

pub mod optimizer {
	pub const ADAM_BETA1: f32 = 0.9;
	pub const ADAM_BETA2: f32 = 0.999;
	pub const ADAM_EPSILON: f32 = 1e-8;
	pub const DICE_SMOOTH: f64 = 1e-5;
}

pub mod checkpoint {
	pub const EXTENSION: &str = "ckpt";
	pub const SUBDIR: &str = "checkpoints";
	pub const FORMAT_VERSION: u32 = 1;
	pub const XZ_LEVEL: u32 = 6;
}

pub mod metrics {
	pub const METRICS_FILE: &str = "metrics.jsonl";
	pub const MODEL_SUMMARY_FILE: &str = "model.txt";
	pub const HISTOGRAM_BINS: usize = 10;
}
