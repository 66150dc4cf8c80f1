// excel2pdf-rpa - Unattended Excel to PDF conversion for RPA schedulers
//
// This is the library crate containing the conversion workflow and data structures.
// The binaries (main.rs, bin/batch.rs) provide the scheduler-facing entry points.

pub mod config;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::{DEFAULT_CONFIG_FILE, RpaConfig};
pub use host::{AutomationHost, AutomationSession, HostError, PowerShellHost};
pub use models::{BatchReport, BatchResults, ConversionOutcome, ExitCodes, FailureKind, Settings};
pub use services::{BatchRequest, ConversionError, ConvertedPdf, Converter, SysinfoSystem};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
