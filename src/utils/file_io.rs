use crate::error::Result;
use log::debug;
use std::fs;
use std::path::Path;

/// Makes sure `dir` exists and is empty.
pub fn refresh_experiment_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
	let dir = dir.as_ref();
	if !dir.exists() {
		fs::create_dir_all(dir)?;
		return Ok(());
	}
	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_dir() {
			fs::remove_dir_all(&path)?;
		} else {
			fs::remove_file(&path)?;
		}
	}
	debug!("Refreshed experiment directory {}", dir.display());
	Ok(())
}

/// Deletes the files of `dir` whose name matches the glob `pattern`. A missing directory is not an error.
pub fn delete_files_with_pattern<P: AsRef<Path>>(dir: P, pattern: &str) -> Result<usize> {
	let dir = dir.as_ref();
	if !dir.is_dir() {
		return Ok(0);
	}
	let pattern = glob::Pattern::new(pattern)?;
	let mut deleted = 0;
	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		let matches = path
			.file_name()
			.and_then(|name| name.to_str())
			.map(|name| pattern.matches(name))
			.unwrap_or(false);
		if matches && path.is_file() {
			fs::remove_file(&path)?;
			deleted += 1;
		}
	}
	Ok(deleted)
}
