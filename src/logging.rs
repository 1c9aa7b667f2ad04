//! Logging Setup Module

use std::path::Path;

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming};

/// Start the global logger.
///
/// `RUST_LOG` overrides `base_level`. Logs go to stderr; with `log_dir` they
/// go to size-rotated files there instead, warnings still copied to stderr.
///
/// Keep the returned handle alive for as long as logging is needed.
pub fn setup_logging(base_level: &str, log_dir: Option<&Path>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(base_level)?;
    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename("chromasky"))
            .duplicate_to_stderr(Duplicate::Warn)
            .rotate(Criterion::Size(1024 * 1024), Naming::Timestamps, Cleanup::KeepLogFiles(5)),
        None => logger.log_to_stderr(),
    };
    logger.start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert!(Logger::try_with_str("info").is_ok());
        assert!(Logger::try_with_str("chromasky=not_a_level").is_err());
    }
}
