pub mod file_io;
pub mod sequence;

pub use self::file_io::{delete_files_with_pattern, refresh_experiment_dir};
pub use self::sequence::ensure_list;
