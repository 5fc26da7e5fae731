use crate::config::TrainerConfig;
use crate::constants::checkpoint::{EXTENSION, FORMAT_VERSION, SUBDIR, XZ_LEVEL};
use crate::error::{Result, TrainError};
use crate::loss::SegmentationLoss;
use crate::network::UNetConfig;
use crate::optim::OptimizerConfig;
use crate::training::state::TrainingState;
use crate::utils::delete_files_with_pattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use xz2::read::{XzDecoder, XzEncoder};

/// Which of the two checkpoints kept per experiment to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
	/// Lowest eval loss seen so far.
	Best,
	/// Most recent epoch.
	Last,
}

impl CheckpointKind {
	pub fn from_str(s: &str) -> Result<Self> {
		match s.to_lowercase().as_str() {
			"best" => Ok(CheckpointKind::Best),
			"last" => Ok(CheckpointKind::Last),
			_ => Err(TrainError::InvalidParameter(format!(
				"Unknown checkpoint kind '{}', expected 'best' or 'last'",
				s
			))),
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			CheckpointKind::Best => "best",
			CheckpointKind::Last => "last",
		}
	}
}

impl fmt::Display for CheckpointKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Everything needed to rebuild a trainer: configuration, progress and burn records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
	pub version: u32,
	pub trainer: TrainerConfig,
	pub state: TrainingState,
	pub network: UNetConfig,
	pub loss: SegmentationLoss,
	pub optimizer: OptimizerConfig,
	pub model_record: Vec<u8>,
	pub optimizer_record: Option<Vec<u8>>,
}

impl CheckpointFile {
	pub fn new(
		trainer: TrainerConfig,
		state: TrainingState,
		network: UNetConfig,
		loss: SegmentationLoss,
		optimizer: OptimizerConfig,
		model_record: Vec<u8>,
		optimizer_record: Option<Vec<u8>>,
	) -> Self {
		Self {
			version: FORMAT_VERSION,
			trainer,
			state,
			network,
			loss,
			optimizer,
			model_record,
			optimizer_record,
		}
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let encoded = bincode::serialize(self)?;
		let mut compressed = Vec::new();
		XzEncoder::new(encoded.as_slice(), XZ_LEVEL).read_to_end(&mut compressed)?;
		Ok(compressed)
	}

	pub fn from_bytes(data: &[u8]) -> Result<Self> {
		let mut decompressed = Vec::new();
		XzDecoder::new(data)
			.read_to_end(&mut decompressed)
			.map_err(|e| TrainError::Checkpoint(format!("Not an xz stream: {}", e)))?;

		let file: CheckpointFile = bincode::deserialize(&decompressed)
			.map_err(|e| TrainError::Checkpoint(format!("Corrupt checkpoint: {}", e)))?;
		if file.version != FORMAT_VERSION {
			return Err(TrainError::Checkpoint(format!(
				"Unsupported checkpoint version {} (expected {})",
				file.version, FORMAT_VERSION
			)));
		}
		Ok(file)
	}

	pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		fs::write(path, self.to_bytes()?)?;
		Ok(())
	}

	pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		if !path.is_file() {
			return Err(TrainError::FileNotFound(path.to_path_buf()));
		}
		Self::from_bytes(&fs::read(path)?)
	}
}

pub fn checkpoint_file_name(kind: CheckpointKind, epoch: usize) -> String {
	format!("{}-{}.{}", kind, epoch, EXTENSION)
}

/// Keeps a single checkpoint per kind inside a directory.
pub struct CheckpointManager {
	dir: PathBuf,
}

impl CheckpointManager {
	pub fn new(dir: impl AsRef<Path>) -> Self {
		Self {
			dir: dir.as_ref().to_path_buf(),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Replaces the previous checkpoint of `kind` and returns the new file's path.
	pub fn save(&self, kind: CheckpointKind, epoch: usize, file: &CheckpointFile) -> Result<PathBuf> {
		fs::create_dir_all(&self.dir)?;
		let removed = delete_files_with_pattern(&self.dir, &format!("*{}*", kind))?;
		if removed > 0 {
			log::debug!("Removed {} previous '{}' checkpoint(s)", removed, kind);
		}

		let path = self.dir.join(checkpoint_file_name(kind, epoch));
		file.write(&path)?;
		log::debug!("Saved {} checkpoint to {}", kind, path.display());
		Ok(path)
	}
}

/// The `kind` checkpoint with the highest epoch, searched in `dir/checkpoints` and then `dir`.
pub fn find_checkpoint<P: AsRef<Path>>(dir: P, kind: CheckpointKind) -> Result<PathBuf> {
	let dir = dir.as_ref();
	if !dir.is_dir() {
		return Err(TrainError::FileNotFound(dir.to_path_buf()));
	}

	let nested = dir.join(SUBDIR);
	let candidates = [nested.as_path(), dir];
	for search_dir in candidates.iter().filter(|d| d.is_dir()) {
		if let Some(path) = latest_in(search_dir, kind)? {
			return Ok(path);
		}
	}

	Err(TrainError::CheckpointNotFound {
		dir: dir.to_path_buf(),
		kind,
	})
}

/// A `.ckpt` path is used as-is; anything else is an experiment directory.
pub fn resolve_checkpoint<P: AsRef<Path>>(source: P, kind: CheckpointKind) -> Result<PathBuf> {
	let source = source.as_ref();
	if source.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
		if source.is_file() {
			Ok(source.to_path_buf())
		} else {
			Err(TrainError::FileNotFound(source.to_path_buf()))
		}
	} else {
		find_checkpoint(source, kind)
	}
}

fn latest_in(dir: &Path, kind: CheckpointKind) -> Result<Option<PathBuf>> {
	let mut best: Option<(usize, PathBuf)> = None;
	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		let epoch = match parse_epoch(&path, kind) {
			Some(epoch) => epoch,
			None => continue,
		};
		if best.as_ref().map_or(true, |(e, _)| epoch >= *e) {
			best = Some((epoch, path));
		}
	}
	Ok(best.map(|(_, path)| path))
}

fn parse_epoch(path: &Path, kind: CheckpointKind) -> Option<usize> {
	if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
		return None;
	}
	let stem = path.file_stem()?.to_str()?;
	let epoch = stem.strip_prefix(kind.as_str())?.strip_prefix('-')?;
	epoch.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn sample_file(epoch: usize) -> CheckpointFile {
		let state = TrainingState {
			current_epoch: epoch,
			best_eval_loss: 0.3,
			..TrainingState::default()
		};
		CheckpointFile::new(
			TrainerConfig::new("exp"),
			state,
			UNetConfig::default(),
			SegmentationLoss::dice(),
			OptimizerConfig::adam(),
			vec![1, 2, 3, 4],
			None,
		)
	}

	#[test]
	fn test_kind_parsing() {
		assert_eq!(CheckpointKind::from_str("BEST").unwrap(), CheckpointKind::Best);
		assert_eq!(CheckpointKind::from_str("last").unwrap(), CheckpointKind::Last);
		assert!(CheckpointKind::from_str("latest").is_err());
		assert_eq!(checkpoint_file_name(CheckpointKind::Best, 7), "best-7.ckpt");
	}

	#[test]
	fn test_file_roundtrip() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("nested/model.ckpt");
		sample_file(3).write(&path).unwrap();

		let back = CheckpointFile::read(&path).unwrap();
		assert_eq!(back.state.current_epoch, 3);
		assert_eq!(back.state.best_eval_loss, 0.3);
		assert_eq!(back.network, UNetConfig::default());
		assert_eq!(back.model_record, vec![1, 2, 3, 4]);
		assert!(back.optimizer_record.is_none());
	}

	#[test]
	fn test_rejects_garbage_and_unknown_versions() {
		assert!(matches!(
			CheckpointFile::from_bytes(b"not a checkpoint"),
			Err(TrainError::Checkpoint(_))
		));

		let mut file = sample_file(0);
		file.version = FORMAT_VERSION + 1;
		let bytes = file.to_bytes().unwrap();
		assert!(matches!(CheckpointFile::from_bytes(&bytes), Err(TrainError::Checkpoint(_))));
	}

	#[test]
	fn test_manager_keeps_one_file_per_kind() {
		let dir = TempDir::new().unwrap();
		let manager = CheckpointManager::new(dir.path().join(SUBDIR));
		manager.save(CheckpointKind::Best, 1, &sample_file(1)).unwrap();
		manager.save(CheckpointKind::Last, 1, &sample_file(1)).unwrap();
		manager.save(CheckpointKind::Last, 2, &sample_file(2)).unwrap();

		let mut names: Vec<String> = fs::read_dir(manager.dir())
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		names.sort();
		assert_eq!(names, vec!["best-1.ckpt", "last-2.ckpt"]);
	}

	#[test]
	fn test_find_picks_highest_epoch() {
		let dir = TempDir::new().unwrap();
		let ckpt_dir = dir.path().join(SUBDIR);
		fs::create_dir_all(&ckpt_dir).unwrap();
		for name in &["last-2.ckpt", "last-10.ckpt", "best-4.ckpt", "last-x.ckpt"] {
			fs::write(ckpt_dir.join(name), b"").unwrap();
		}

		let last = find_checkpoint(dir.path(), CheckpointKind::Last).unwrap();
		assert_eq!(last.file_name().unwrap(), "last-10.ckpt");
		let best = find_checkpoint(&ckpt_dir, CheckpointKind::Best).unwrap();
		assert_eq!(best.file_name().unwrap(), "best-4.ckpt");
	}

	#[test]
	fn test_find_errors() {
		let dir = TempDir::new().unwrap();
		assert!(matches!(
			find_checkpoint(dir.path(), CheckpointKind::Best),
			Err(TrainError::CheckpointNotFound { kind: CheckpointKind::Best, .. })
		));
		assert!(matches!(
			find_checkpoint(dir.path().join("missing"), CheckpointKind::Last),
			Err(TrainError::FileNotFound(_))
		));
	}

	#[test]
	fn test_resolve_checkpoint() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("custom.ckpt");
		assert!(matches!(
			resolve_checkpoint(&file, CheckpointKind::Best),
			Err(TrainError::FileNotFound(_))
		));
		fs::write(&file, b"").unwrap();
		assert_eq!(resolve_checkpoint(&file, CheckpointKind::Best).unwrap(), file);
		// A directory holding only a custom file has no 'best' checkpoint.
		assert!(resolve_checkpoint(dir.path(), CheckpointKind::Best).is_err());
	}
}
