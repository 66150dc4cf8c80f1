use serde::{Deserialize, Serialize};

/// Typed snapshot of the merged configuration.
///
/// `Default` is the built-in configuration document; [`crate::config::RpaConfig`]
/// serializes it as the bottom layer under the override file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub excel: ExcelSettings,
    pub pdf: PdfSettings,
    pub rpa: RpaSettings,
    pub cleanup: CleanupSettings,
    pub batch: BatchSettings,
}

/// Host application behavior (`excel.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelSettings {
    /// Deadline for each automation call, in seconds
    pub timeout_seconds: u64,
    /// Number of attempts to open a workbook
    pub retry_attempts: u32,
    /// Delay between open attempts, in seconds
    pub retry_delay: f64,
    pub visible: bool,
    pub display_alerts: bool,
    /// Shell used to host the automation session
    pub automation_shell: String,
}

impl Default for ExcelSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            retry_attempts: 3,
            retry_delay: 5.0,
            visible: false,
            display_alerts: false,
            automation_shell: "powershell".to_string(),
        }
    }
}

/// Export behavior (`pdf.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfSettings {
    pub default_quality: u32,
    pub default_orientation: String,
    pub margins_cm: f64,
    pub header_footer_margin_cm: f64,
    pub fit_to_width: bool,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            default_quality: 600,
            default_orientation: "auto".to_string(),
            margins_cm: 1.0,
            header_footer_margin_cm: 0.5,
            fit_to_width: true,
        }
    }
}

impl PdfSettings {
    pub fn orientation(&self) -> OrientationPreference {
        OrientationPreference::parse(&self.default_orientation)
    }
}

/// Requested page orientation from `pdf.default_orientation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationPreference {
    /// Choose per sheet from the used range shape
    Auto,
    Portrait,
    Landscape,
}

impl OrientationPreference {
    /// Anything that is neither `auto` nor `landscape` prints portrait.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else if value.eq_ignore_ascii_case("landscape") {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

/// Scheduler integration (`rpa.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpaSettings {
    pub exit_codes: ExitCodes,
    pub log_level: String,
    pub log_dir: String,
}

impl Default for RpaSettings {
    fn default() -> Self {
        Self {
            exit_codes: ExitCodes::default(),
            log_level: "INFO".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

/// Process exit statuses reported to the RPA scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCodes {
    pub success: i32,
    pub file_not_found: i32,
    pub excel_error: i32,
    pub timeout: i32,
    pub permission_error: i32,
    pub general_error: i32,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            success: 0,
            file_not_found: 1,
            excel_error: 2,
            timeout: 3,
            permission_error: 4,
            general_error: 99,
        }
    }
}

impl ExitCodes {
    /// Exit status for a failed conversion
    pub fn for_failure(&self, kind: FailureKind) -> i32 {
        match kind {
            FailureKind::FileNotFound => self.file_not_found,
            FailureKind::Permission => self.permission_error,
            FailureKind::Timeout => self.timeout,
            FailureKind::HostApplication => self.excel_error,
            FailureKind::General => self.general_error,
        }
    }
}

/// Classification of a conversion failure for exit-code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    FileNotFound,
    Permission,
    Timeout,
    HostApplication,
    General,
}

/// Orphaned instance cleanup (`cleanup.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSettings {
    pub kill_orphaned_excel: bool,
    pub max_excel_processes: usize,
    /// Case-insensitive fragment matched against process names
    pub process_name: String,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            kill_orphaned_excel: true,
            max_excel_processes: 5,
            process_name: "excel".to_string(),
        }
    }
}

/// Batch driver defaults (`batch.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub pattern: String,
    pub output_subdir: String,
    pub report_dir: String,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            pattern: "*.xlsx".to_string(),
            output_subdir: "pdf_output".to_string(),
            report_dir: ".".to_string(),
        }
    }
}
