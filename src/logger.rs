//! Logger initialisation for the dome control binary.

use std::path::Path;

use log::LevelFilter;
use thiserror::Error;

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

/// Initialise the logger for this execution.
///
/// Logs go to stdout, and additionally to `log_file` when one is given.
/// Must only be called once.
pub fn logger_init(
    min_level: LevelFilter,
    log_file: Option<&Path>,
) -> Result<(), LoggerInitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {:5}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(min_level)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(match fern::log_file(path) {
            Ok(f) => f,
            Err(e) => return Err(LoggerInitError::LogFileInitError(e)),
        });
    }

    match dispatch.apply() {
        Ok(_) => Ok(()),
        Err(e) => Err(LoggerInitError::FernInitError(e)),
    }
}
