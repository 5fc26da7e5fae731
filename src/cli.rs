use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

pub fn build_cli() -> ArgMatches<'static> {
	build_app().get_matches()
}

pub fn build_app() -> App<'static, 'static> {
	App::new("segtrain")
		.version(concat!("v", env!("CARGO_PKG_VERSION")))
		.about("Trains segmentation networks and resumes them from checkpoints")
		.settings(&[
			AppSettings::SubcommandRequiredElseHelp,
			AppSettings::VersionlessSubcommands,
		])
		.subcommand(build_train_subcommand())
		.subcommand(build_resume_subcommand())
		.subcommand(build_inspect_subcommand())
		.subcommand(build_generate_config_subcommand())
}

fn build_train_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("train")
		.about("Train a new network on a synthetic segmentation dataset")
		.arg(
			Arg::with_name("CONFIG_FILE")
				.short("c")
				.long("config")
				.value_name("CONFIG_FILE")
				.help("Run configuration (.toml or .json). Defaults are used when absent")
				.empty_values(false),
		)
		.arg(build_experiment_dir_arg())
		.arg(build_epochs_arg())
		.arg(
			Arg::with_name("BATCH_SIZE")
				.short("b")
				.long("batch-size")
				.value_name("N")
				.help("Number of samples per training batch")
				.empty_values(false),
		)
		.arg(build_learning_rate_arg())
		.arg(build_samples_arg())
		.arg(
			Arg::with_name("REFRESH")
				.long("refresh")
				.help("Delete the contents of the experiment directory before training"),
		)
		.arg(
			Arg::with_name("SAVE")
				.long("save")
				.value_name("CHECKPOINT_FILE")
				.help("Also write the final state to this checkpoint file")
				.empty_values(false),
		)
}

fn build_resume_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("resume")
		.about("Reload a checkpoint and continue training")
		.arg(build_source_arg())
		.arg(build_checkpoint_kind_arg())
		.arg(
			Arg::with_name("CONFIG_FILE")
				.short("c")
				.long("config")
				.value_name("CONFIG_FILE")
				.help("Run configuration whose [dataset] section feeds the continued run")
				.empty_values(false),
		)
		.arg(build_experiment_dir_arg().help("Write new checkpoints and metrics to this directory instead"))
		.arg(build_epochs_arg())
		.arg(build_learning_rate_arg())
		.arg(build_samples_arg())
		.arg(
			Arg::with_name("SEED")
				.long("seed")
				.value_name("SEED")
				.help("Seed of the synthetic dataset. Default: 0")
				.empty_values(false),
		)
}

fn build_inspect_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("inspect")
		.about("Print the configuration, training state and network of a checkpoint")
		.arg(build_source_arg())
		.arg(build_checkpoint_kind_arg())
}

fn build_generate_config_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("generate-config")
		.about("Write a run configuration file with default values")
		.arg(
			Arg::with_name("OUTPUT_FILE")
				.index(1)
				.help("Destination file. Default: segtrain.toml"),
		)
		.arg(
			Arg::with_name("FORMAT")
				.short("f")
				.long("format")
				.value_name("FORMAT")
				.possible_values(&["toml", "json"])
				.help("Output format. Default: toml"),
		)
		.arg(
			Arg::with_name("EXAMPLE")
				.short("e")
				.long("example")
				.help("Write a commented example (TOML only)"),
		)
		.arg(
			Arg::with_name("FORCE")
				.long("force")
				.help("Overwrite an existing file"),
		)
}

fn build_source_arg() -> Arg<'static, 'static> {
	Arg::with_name("SOURCE")
		.required(true)
		.index(1)
		.help("Experiment directory or .ckpt file")
}

fn build_checkpoint_kind_arg() -> Arg<'static, 'static> {
	Arg::with_name("CHECKPOINT")
		.short("k")
		.long("checkpoint")
		.value_name("KIND")
		.possible_values(&["best", "last"])
		.help("Which checkpoint of an experiment directory to load. Default: best")
}

fn build_experiment_dir_arg() -> Arg<'static, 'static> {
	Arg::with_name("EXPERIMENT_DIR")
		.short("d")
		.long("experiment-dir")
		.value_name("DIR")
		.help("Directory receiving checkpoints and metrics")
		.empty_values(false)
}

fn build_epochs_arg() -> Arg<'static, 'static> {
	Arg::with_name("EPOCHS")
		.short("n")
		.long("epochs")
		.value_name("N")
		.help("Number of epochs to train")
		.empty_values(false)
}

fn build_learning_rate_arg() -> Arg<'static, 'static> {
	Arg::with_name("LEARNING_RATE")
		.short("r")
		.long("lr")
		.value_name("LEARNING_RATE")
		.help("Learning rate of the optimizer")
		.empty_values(false)
}

fn build_samples_arg() -> Arg<'static, 'static> {
	Arg::with_name("SAMPLES")
		.short("s")
		.long("samples")
		.value_name("N")
		.help("Number of synthetic samples")
		.empty_values(false)
}
