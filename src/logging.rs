use env_logger::{Builder, Env};
use std::io::Write;

/// Console logger for the binary. `RUST_LOG` overrides the default `info` level.
pub fn init_simple_logger() {
	init_logger("info");
}

/// Same as [`init_simple_logger`] with another default level. Repeated calls are ignored.
pub fn init_logger(default_level: &str) {
	let _ = Builder::from_env(Env::default().default_filter_or(default_level))
		.format(|buf, record| {
			writeln!(
				buf,
				"[{} {:<5} {}] {}",
				chrono::Local::now().format("%H:%M:%S"),
				record.level(),
				record.target(),
				record.args()
			)
		})
		.try_init();
}
