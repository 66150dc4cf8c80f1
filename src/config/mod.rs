use crate::models::{
    BatchSettings, CleanupSettings, ExcelSettings, ExitCodes, PdfSettings, RpaSettings, Settings,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigError, File, FileFormat};
use serde::de::DeserializeOwned;

/// Override file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "rpa_config.json";

/// Layered configuration: built-in defaults under an optional JSON override file.
///
/// Loading never fails. A missing override file silently yields the defaults; a
/// malformed one is reported through [`warning`](Self::warning) and ignored.
/// Values are read by dotted path (`"excel.retry_attempts"`) with a caller fallback.
#[derive(Debug, Clone)]
pub struct RpaConfig {
    config: Config,
    source: Option<Utf8PathBuf>,
    warning: Option<String>,
}

impl RpaConfig {
    /// Configuration made of the built-in defaults only
    pub fn defaults() -> Self {
        Self {
            config: layered(None).unwrap_or_default(),
            source: None,
            warning: None,
        }
    }

    /// Load the defaults and merge the override file at `path` on top.
    ///
    /// Keys present in the file supersede the defaults; everything else,
    /// including sibling keys of a partially overridden namespace, keeps its
    /// default value.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Self {
        let path = path.as_ref();

        match layered(Some(path)) {
            Ok(config) => {
                let source = path.is_file().then(|| path.to_path_buf());
                if let Some(source) = &source {
                    tracing::info!("Configuration loaded from {}", source);
                }
                Self {
                    config,
                    source,
                    warning: None,
                }
            }
            Err(e) => {
                let warning = format!(
                    "Failed to load configuration from {}: {}; using defaults",
                    path, e
                );
                tracing::warn!("{}", warning);
                Self {
                    warning: Some(warning),
                    ..Self::defaults()
                }
            }
        }
    }

    /// Look up a dotted key path, returning `fallback` when any segment is
    /// missing, is not a nested mapping, or holds a value of another type.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.config.get::<T>(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Config key '{}' unavailable ({}), using fallback", key, e);
                fallback
            }
        }
    }

    /// Build the typed settings snapshot, key by key.
    pub fn settings(&self) -> Settings {
        let d = Settings::default();

        Settings {
            excel: ExcelSettings {
                timeout_seconds: self.get_or("excel.timeout_seconds", d.excel.timeout_seconds),
                retry_attempts: self.get_or("excel.retry_attempts", d.excel.retry_attempts),
                retry_delay: self.get_or("excel.retry_delay", d.excel.retry_delay),
                visible: self.get_or("excel.visible", d.excel.visible),
                display_alerts: self.get_or("excel.display_alerts", d.excel.display_alerts),
                automation_shell: self.get_or("excel.automation_shell", d.excel.automation_shell),
            },
            pdf: PdfSettings {
                default_quality: self.get_or("pdf.default_quality", d.pdf.default_quality),
                default_orientation: self
                    .get_or("pdf.default_orientation", d.pdf.default_orientation),
                margins_cm: self.get_or("pdf.margins_cm", d.pdf.margins_cm),
                header_footer_margin_cm: self
                    .get_or("pdf.header_footer_margin_cm", d.pdf.header_footer_margin_cm),
                fit_to_width: self.get_or("pdf.fit_to_width", d.pdf.fit_to_width),
            },
            rpa: RpaSettings {
                exit_codes: self.exit_codes(&d.rpa.exit_codes),
                log_level: self.get_or("rpa.log_level", d.rpa.log_level),
                log_dir: self.get_or("rpa.log_dir", d.rpa.log_dir),
            },
            cleanup: CleanupSettings {
                kill_orphaned_excel: self
                    .get_or("cleanup.kill_orphaned_excel", d.cleanup.kill_orphaned_excel),
                max_excel_processes: self
                    .get_or("cleanup.max_excel_processes", d.cleanup.max_excel_processes),
                process_name: self.get_or("cleanup.process_name", d.cleanup.process_name),
            },
            batch: BatchSettings {
                pattern: self.get_or("batch.pattern", d.batch.pattern),
                output_subdir: self.get_or("batch.output_subdir", d.batch.output_subdir),
                report_dir: self.get_or("batch.report_dir", d.batch.report_dir),
            },
        }
    }

    fn exit_codes(&self, d: &ExitCodes) -> ExitCodes {
        ExitCodes {
            success: self.get_or("rpa.exit_codes.success", d.success),
            file_not_found: self.get_or("rpa.exit_codes.file_not_found", d.file_not_found),
            excel_error: self.get_or("rpa.exit_codes.excel_error", d.excel_error),
            timeout: self.get_or("rpa.exit_codes.timeout", d.timeout),
            permission_error: self.get_or("rpa.exit_codes.permission_error", d.permission_error),
            general_error: self.get_or("rpa.exit_codes.general_error", d.general_error),
        }
    }

    /// Override file that was merged, if one was found and parsed
    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    /// Why the override file was ignored, if it was
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

impl Default for RpaConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

fn layered(override_file: Option<&Utf8Path>) -> Result<Config, ConfigError> {
    let defaults = serde_json::to_string(&Settings::default())
        .map_err(|e| ConfigError::Message(e.to_string()))?;

    let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));
    if let Some(path) = override_file {
        builder = builder.add_source(File::new(path.as_str(), FileFormat::Json).required(false));
    }

    builder.build()
}
