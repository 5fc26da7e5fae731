use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::training::CheckpointKind;

#[derive(Debug, Error)]
pub enum TrainError {
	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Invalid parameter: {0}")]
	InvalidParameter(String),

	#[error("File not found: {}", .0.display())]
	FileNotFound(PathBuf),

	#[error("No '{kind}' checkpoint found in {}", .dir.display())]
	CheckpointNotFound { dir: PathBuf, kind: CheckpointKind },

	#[error("Checkpoint error: {0}")]
	Checkpoint(String),

	#[error("Record error: {0}")]
	Record(String),

	#[error("Training error: {0}")]
	Training(String),

	#[error("Dataset error: {0}")]
	Dataset(String),
}

impl From<bincode::Error> for TrainError {
	fn from(err: bincode::Error) -> Self {
		TrainError::Serialization(err.to_string())
	}
}

impl From<serde_json::Error> for TrainError {
	fn from(err: serde_json::Error) -> Self {
		TrainError::Parse(format!("JSON: {}", err))
	}
}

impl From<toml::de::Error> for TrainError {
	fn from(err: toml::de::Error) -> Self {
		TrainError::Parse(format!("TOML: {}", err))
	}
}

impl From<toml::ser::Error> for TrainError {
	fn from(err: toml::ser::Error) -> Self {
		TrainError::Serialization(format!("TOML: {}", err))
	}
}

impl From<glob::PatternError> for TrainError {
	fn from(err: glob::PatternError) -> Self {
		TrainError::InvalidParameter(format!("Bad file pattern: {}", err))
	}
}

impl From<burn::record::RecorderError> for TrainError {
	fn from(err: burn::record::RecorderError) -> Self {
		TrainError::Record(format!("{:?}", err))
	}
}

pub type Result<T> = std::result::Result<T, TrainError>;
