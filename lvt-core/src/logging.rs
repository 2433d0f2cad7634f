//! Logger installation.
//!
//! Library code only uses the `log` facade. Binaries pick a sink here: the
//! CLI logs to stderr, instrumentation modules and plugins (which run
//! without a console) append to a file in the temp directory.

use std::fs::OpenOptions;
use std::path::PathBuf;

use log::LevelFilter;

use crate::errors::LvtError;

/// Default level for the console: warnings only, debug when verbose.
pub fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install a stderr logger. `RUST_LOG` overrides `level`.
pub fn init_console_logger(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

/// `<temp>/<file_name>`.
pub fn log_file_path(file_name: &str) -> PathBuf {
    std::env::temp_dir().join(file_name)
}

/// Install a logger appending to `<temp>/<file_name>`.
///
/// Only the first call in a process installs anything; later calls (for
/// example a second module sharing the process) return `Ok` and keep the
/// existing logger.
pub fn init_file_logger(file_name: &str, level: LevelFilter) -> Result<PathBuf, LvtError> {
    let path = log_file_path(file_name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level() {
        assert_eq!(console_level(false), LevelFilter::Warn);
        assert_eq!(console_level(true), LevelFilter::Debug);
    }

    #[test]
    fn test_log_file_lives_in_temp() {
        let path = log_file_path("lvt_tap.log");
        assert_eq!(path.parent(), Some(std::env::temp_dir().as_path()));
        assert!(path.ends_with("lvt_tap.log"));
    }
}
