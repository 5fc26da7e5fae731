//! Supervised training of segmentation networks: a synthetic dataset, a 2D U-Net,
//! segmentation losses, and a trainer that evaluates, stops early and keeps
//! `best`/`last` checkpoints per experiment directory.

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_file;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod loss;
pub mod network;
pub mod optim;
pub mod training;
pub mod utils;

pub use crate::config::{StateFile, TrainerConfig, TrainerConfigBuilder};
pub use crate::config_file::RunConfigFile;
pub use crate::dataset::{Dataset, Sample, SyntheticSegmentationDataset};
pub use crate::error::{Result, TrainError};
pub use crate::loss::{LossKind, OutputActivation, SegmentationLoss};
pub use crate::network::{NetworkSummary, SegmentationNetwork, UNet, UNetConfig};
pub use crate::optim::{OptimizerConfig, TrainableOptimizer};
pub use crate::training::{CheckpointKind, SupervisedTrainer, TrainingState};

/// CPU backend with automatic differentiation, used by the binary and the tests.
pub type CpuBackend = burn::backend::Autodiff<burn::backend::NdArray>;
