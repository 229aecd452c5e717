//! Logging to standard error.
use colored::Colorize;
use log::{Level, Log, Metadata, Record, SetLoggerError};

struct Logger {
    level: Level,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN".yellow().bold(),
            Level::Info => "INFO".green(),
            Level::Debug => "DEBUG".blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        eprintln!("{level} {} {}", record.target().dimmed(), record.args());
    }

    fn flush(&self) {}
}

/// Parse a log level. `none` disables logging.
pub fn level(s: &str) -> Option<Option<Level>> {
    match s.to_lowercase().as_str() {
        "none" => Some(None),
        "error" => Some(Some(Level::Error)),
        "warn" | "warning" => Some(Some(Level::Warn)),
        "info" => Some(Some(Level::Info)),
        "debug" => Some(Some(Level::Debug)),
        "trace" => Some(Some(Level::Trace)),
        _ => None,
    }
}

/// Install the logger for messages at `level` and above.
pub fn init(level: Level) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { level }))?;
    log::set_max_level(level.to_level_filter());

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(level("none"), Some(None));
        assert_eq!(level("Warning"), Some(Some(Level::Warn)));
        assert_eq!(level("debug"), Some(Some(Level::Debug)));
        assert_eq!(level("loud"), None);
    }
}
