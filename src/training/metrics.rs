use crate::constants::metrics::{HISTOGRAM_BINS, METRICS_FILE, MODEL_SUMMARY_FILE};
use crate::error::Result;
use serde::Serialize;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Which counter a scalar is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestep {
	Step,
	Epoch,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Event<'a> {
	Scalar {
		tag: &'a str,
		value: f64,
		step: usize,
		wall_time: String,
	},
	Histogram {
		tag: &'a str,
		step: usize,
		min: f64,
		max: f64,
		mean: f64,
		std: f64,
		counts: Vec<usize>,
		wall_time: String,
	},
}

/// Appends scalar and histogram events as JSON lines under the experiment directory.
pub struct MetricsWriter {
	dir: PathBuf,
	out: BufWriter<File>,
}

impl MetricsWriter {
	pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir)?;
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(dir.join(METRICS_FILE))?;
		Ok(Self {
			dir,
			out: BufWriter::new(file),
		})
	}

	pub fn path(&self) -> PathBuf {
		self.dir.join(METRICS_FILE)
	}

	pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
		self.write_event(&Event::Scalar {
			tag,
			value,
			step,
			wall_time: now(),
		})
	}

	/// Summary statistics and a fixed-bin histogram of `values`. Empty inputs are skipped.
	pub fn add_histogram(&mut self, tag: &str, values: &[f32], step: usize) -> Result<()> {
		if values.is_empty() {
			return Ok(());
		}
		let n = values.len() as f64;
		let min = values.iter().copied().fold(f32::INFINITY, f32::min) as f64;
		let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
		let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
		let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;

		let mut counts = vec![0; HISTOGRAM_BINS];
		let width = (max - min) / HISTOGRAM_BINS as f64;
		for &v in values {
			let bin = if width > 0.0 {
				(((v as f64 - min) / width) as usize).min(HISTOGRAM_BINS - 1)
			} else {
				0
			};
			counts[bin] += 1;
		}

		self.write_event(&Event::Histogram {
			tag,
			step,
			min,
			max,
			mean,
			std: var.sqrt(),
			counts,
			wall_time: now(),
		})
	}

	/// Writes the network structure next to the metrics file.
	pub fn write_model_summary(&self, summary: &impl Display) -> Result<()> {
		fs::write(self.dir.join(MODEL_SUMMARY_FILE), format!("{}\n", summary))?;
		Ok(())
	}

	pub fn flush(&mut self) -> Result<()> {
		self.out.flush()?;
		Ok(())
	}

	fn write_event(&mut self, event: &Event) -> Result<()> {
		serde_json::to_writer(&mut self.out, event)?;
		self.out.write_all(b"\n")?;
		Ok(())
	}
}

impl Drop for MetricsWriter {
	fn drop(&mut self) {
		let _ = self.out.flush();
	}
}

fn now() -> String {
	chrono::Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn read_events(path: &Path) -> Vec<serde_json::Value> {
		fs::read_to_string(path)
			.unwrap()
			.lines()
			.map(|line| serde_json::from_str(line).unwrap())
			.collect()
	}

	#[test]
	fn test_scalars_are_appended_as_json_lines() {
		let dir = TempDir::new().unwrap();
		let mut writer = MetricsWriter::new(dir.path()).unwrap();
		writer.add_scalar("train_loss", 0.5, 1).unwrap();
		writer.add_scalar("train_loss", 0.25, 2).unwrap();
		writer.flush().unwrap();

		let events = read_events(&writer.path());
		assert_eq!(events.len(), 2);
		assert_eq!(events[0]["kind"], "scalar");
		assert_eq!(events[1]["value"], 0.25);
		assert_eq!(events[1]["step"], 2);
	}

	#[test]
	fn test_histogram_statistics() {
		let dir = TempDir::new().unwrap();
		let mut writer = MetricsWriter::new(dir.path()).unwrap();
		writer.add_histogram("w", &[0.0, 1.0, 2.0, 3.0], 0).unwrap();
		writer.add_histogram("empty", &[], 0).unwrap();
		writer.flush().unwrap();

		let events = read_events(&writer.path());
		assert_eq!(events.len(), 1);
		assert_eq!(events[0]["min"], 0.0);
		assert_eq!(events[0]["max"], 3.0);
		assert_eq!(events[0]["mean"], 1.5);
		let counts: Vec<u64> = events[0]["counts"]
			.as_array()
			.unwrap()
			.iter()
			.map(|c| c.as_u64().unwrap())
			.collect();
		assert_eq!(counts.iter().sum::<u64>(), 4);
		assert_eq!(counts[HISTOGRAM_BINS - 1], 1);
	}

	#[test]
	fn test_constant_values_land_in_first_bin() {
		let dir = TempDir::new().unwrap();
		let mut writer = MetricsWriter::new(dir.path()).unwrap();
		writer.add_histogram("bias", &[0.0; 5], 3).unwrap();
		writer.flush().unwrap();

		let events = read_events(&writer.path());
		assert_eq!(events[0]["counts"][0], 5);
	}
}
