use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the daily log files: `excel_to_pdf_rpa.<YYYY-MM-DD>.log`
pub const LOG_FILE_PREFIX: &str = "excel_to_pdf_rpa";

/// Map a scheduler-style level name to a tracing filter directive.
///
/// Accepts the names RPA scripts traditionally pass (`DEBUG`, `INFO`,
/// `WARNING`, `ERROR`, `CRITICAL`) plus `WARN` and `TRACE`, case-insensitively.
pub fn parse_log_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" | "CRITICAL" | "FATAL" => Some("error"),
        _ => None,
    }
}

/// Setup logging with a daily file appender and console output.
///
/// One file per calendar day is created in `log_dir` and appended to across runs.
///
/// # Arguments
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `level` - Level name, see [`parse_log_level`]; unknown names log at info
/// * `console_output` - If true, also log to stdout
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(
    log_dir: &Utf8Path,
    level: &str,
    console_output: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create log file in {}", log_dir))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directive = parse_log_level(level).unwrap_or("info");
    let env_filter = EnvFilter::new(directive);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true);

    if console_output {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .context("Logging already initialized")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
            .context("Logging already initialized")?;
    }

    tracing::info!(
        "Logging initialized: dir={}, level={}, console={}",
        log_dir,
        directive,
        console_output
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), Some("debug"));
        assert_eq!(parse_log_level("info"), Some("info"));
        assert_eq!(parse_log_level("Warning"), Some("warn"));
        assert_eq!(parse_log_level("WARN"), Some("warn"));
        assert_eq!(parse_log_level("CRITICAL"), Some("error"));
        assert_eq!(parse_log_level(" error "), Some("error"));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    #[allow(unused_variables)]
    fn test_setup_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        // Might fail if another test installed a subscriber first,
        // but the directory is created before that point
        let result = setup_logging(&log_dir, "INFO", false);

        assert!(log_dir.exists());
    }
}
