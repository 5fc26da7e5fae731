pub mod checkpoint;
pub mod data_loader;
pub mod metrics;
pub mod state;
pub mod trainer;

pub use self::checkpoint::{
	checkpoint_file_name, find_checkpoint, resolve_checkpoint, CheckpointFile, CheckpointKind, CheckpointManager,
};
pub use self::data_loader::{split_indices, Batch, DataLoader};
pub use self::metrics::{MetricsWriter, Timestep};
pub use self::state::TrainingState;
pub use self::trainer::SupervisedTrainer;
