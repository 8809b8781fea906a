use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level configuration, loadable from `DaemonOptions` (spec §6).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    #[must_use]
    pub fn default_for_build() -> Self {
        #[cfg(debug_assertions)]
        {
            LogLevel::Debug
        }
        #[cfg(not(debug_assertions))]
        {
            LogLevel::Info
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::default_for_build()
    }
}

/// Initializes `tracing` with both a rotating file appender and stdout, the
/// way the teacher's `init_logging` does for its Tauri app — minus the
/// Tauri-specific directive suppressions, which don't apply to a daemon.
///
/// # Arguments
/// * `log_dir` - directory to store rotated log files in
/// * `log_level` - the minimum level this crate's own spans/events log at
pub fn init_logging(log_dir: &Path, log_level: LogLevel) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("failed to create log directory: {e}"))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix("displaypowerd.log")
        .max_log_files(7)
        .build(log_dir)
        .map_err(|e| format!("failed to create log file appender: {e}"))?;

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false).with_target(true).with_line_number(true);

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(true).with_line_number(true);

    let level = log_level.to_tracing_level();
    let crate_directive = format!("displaypowerd={}", log_level.to_string().to_lowercase());
    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(crate_directive.parse().map_err(|e| format!("invalid log directive: {e}"))?);

    tracing_subscriber::registry().with(env_filter).with(file_layer).with(stdout_layer).init();

    tracing::info!("logging initialized at level: {log_level}");
    tracing::info!("log directory: {}", log_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn log_level_parsing_is_lowercase_only() {
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert!(LogLevel::from_str("Debug").is_err());
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn log_level_to_tracing_level_round_trips() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
    }

    #[test]
    fn log_level_serialization() {
        let json = serde_json::to_string(&LogLevel::Info).unwrap();
        assert_eq!(json, "\"info\"");
        let deserialized: LogLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, LogLevel::Info);
    }
}
