//! JSON structured logging for peforge consumers
//!
//! The library itself only talks to the `log` facade. Tools embedding it can
//! install [`JsonLogger`] to get one JSON object per line, or a human format
//! through `env_logger`.

use chrono::{Local, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::json;
use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

/// Environment variable holding the level, optionally prefixed with `json:`
pub const LOG_LEVEL_ENV: &str = "PEFORGE_LOG_LEVEL";

/// Environment variable naming a file to append JSON lines to
pub const LOG_PATH_ENV: &str = "PEFORGE_LOG_PATH";

/// JSON logger implementation
#[derive(Debug)]
pub struct JsonLogger {
    level: Level,
    target_file: Mutex<Option<std::fs::File>>,
}

/// Split a level string such as `json:debug` into (json?, level)
fn split_level(level_str: &str) -> (bool, &str) {
    if let Some(stripped) = level_str.strip_prefix("json:") {
        (true, stripped)
    } else if level_str == "json" {
        (true, "info")
    } else {
        (false, level_str)
    }
}

fn parse_filter(level: &str) -> LevelFilter {
    match level {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

impl JsonLogger {
    /// Create a new JSON logger
    pub fn new(level: Level, log_path: Option<String>) -> Self {
        let target_file = if let Some(path) = log_path {
            OpenOptions::new().create(true).append(true).open(path).ok()
        } else {
            None
        };

        JsonLogger {
            level,
            target_file: Mutex::new(target_file),
        }
    }

    /// Initialize the logger with the given level string.
    ///
    /// Returns the effective level name.
    pub fn init_with_level(level_str: &str) -> String {
        let (use_json, actual_level) = split_level(level_str);
        let filter = parse_filter(actual_level);

        if !use_json {
            let result = env_logger::Builder::new()
                .filter_level(filter)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "[{} {} {}] {}",
                        Local::now().format("%Y-%m-%dT%H:%M:%S"),
                        record.level(),
                        record.target(),
                        record.args()
                    )
                })
                .try_init();
            if let Err(e) = result {
                eprintln!("Failed to initialize logger: {e}");
            }
            return actual_level.to_string();
        }

        let level = filter.to_level().unwrap_or(Level::Error);
        let logger = Box::new(JsonLogger::new(level, env::var(LOG_PATH_ENV).ok()));

        if let Err(e) = log::set_boxed_logger(logger) {
            eprintln!("Failed to initialize JSON logger: {e}");
            return actual_level.to_string();
        }

        log::set_max_level(filter);
        actual_level.to_string()
    }

    /// Initialize from `PEFORGE_LOG_LEVEL`, defaulting to `warn`
    pub fn init() -> String {
        let log_level = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "warn".to_string());
        Self::init_with_level(&log_level)
    }

    fn render(record: &Record<'_>) -> String {
        let log_entry = json!({
            "@timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "@level": record.level().to_string().to_lowercase(),
            "@message": record.args().to_string(),
            "@module": record.target(),
            "@pid": std::process::id(),
            "@file": record.file().unwrap_or("unknown"),
            "@line": record.line().unwrap_or(0),
        });

        format!(
            "{}\n",
            serde_json::to_string(&log_entry).unwrap_or_default()
        )
    }
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::render(record);

        if let Ok(mut file_guard) = self.target_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
                return;
            }
        }
        let _ = io::stderr().write_all(line.as_bytes());
        let _ = io::stderr().flush();
    }

    fn flush(&self) {
        if let Ok(mut file_guard) = self.target_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let _ = file.flush();
            }
        }
        let _ = io::stderr().flush();
    }
}

/// Helper to check if JSON logging is requested
pub fn is_json_logging() -> bool {
    env::var(LOG_LEVEL_ENV)
        .map(|v| v.starts_with("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_level() {
        assert_eq!(split_level("json:debug"), (true, "debug"));
        assert_eq!(split_level("json"), (true, "info"));
        assert_eq!(split_level("trace"), (false, "trace"));
        assert_eq!(parse_filter("bogus"), LevelFilter::Info);
    }

    #[test]
    fn test_json_logger_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peforge.log");
        let logger = JsonLogger::new(Level::Info, Some(path.display().to_string()));

        assert!(logger.enabled(&Metadata::builder().level(Level::Warn).build()));
        assert!(!logger.enabled(&Metadata::builder().level(Level::Debug).build()));

        logger.log(
            &Record::builder()
                .args(format_args!("cert lookup ambiguous"))
                .level(Level::Warn)
                .target("peforge::store")
                .build(),
        );
        logger.flush();

        let written = std::fs::read_to_string(&path).unwrap();
        let entry: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(entry["@level"], "warn");
        assert_eq!(entry["@message"], "cert lookup ambiguous");
        assert_eq!(entry["@module"], "peforge::store");
    }
}
