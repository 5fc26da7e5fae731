use crate::config_file::RunConfigFile;
use crate::error::{Result, TrainError};
use clap::ArgMatches;
use log::info;
use std::fs;
use std::path::Path;

pub fn generate_config(app_m: &ArgMatches) -> Result<()> {
	let output_path = app_m.value_of("OUTPUT_FILE").unwrap_or("segtrain.toml");
	let format = app_m.value_of("FORMAT").unwrap_or("toml");

	if Path::new(output_path).exists() && !app_m.is_present("FORCE") {
		return Err(TrainError::InvalidParameter(format!(
			"File {} already exists. Use --force to overwrite",
			output_path
		)));
	}

	if app_m.is_present("EXAMPLE") {
		if format != "toml" {
			return Err(TrainError::InvalidParameter(
				"Example configuration with comments is only available in TOML format".to_string(),
			));
		}
		fs::write(output_path, RunConfigFile::create_example_toml())?;
		info!("Generated example configuration file with comments: {}", output_path);
	} else {
		let config = RunConfigFile::generate_default();
		match format {
			"toml" => config.to_toml_file(output_path)?,
			"json" => config.to_json_file(output_path)?,
			_ => {
				return Err(TrainError::InvalidParameter(format!(
					"Unknown format: {}. Use 'toml' or 'json'",
					format
				)))
			}
		}
		info!("Generated {} configuration file: {}", format.to_uppercase(), output_path);
	}

	info!("Train with it using:");
	info!("  segtrain train --config {}", output_path);
	Ok(())
}
