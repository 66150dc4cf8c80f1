//! Data models for the converter.
//!
//! - [`Settings`]: typed configuration snapshot (`excel`, `pdf`, `rpa`, `cleanup`, `batch`)
//! - [`ExitCodes`] / [`FailureKind`]: exit status mapping for the RPA scheduler
//! - [`ConversionOutcome`] / [`BatchReport`]: per-file results and the batch summary

pub mod config;
pub mod report;

pub use config::{
    BatchSettings, CleanupSettings, ExcelSettings, ExitCodes, FailureKind, OrientationPreference,
    PdfSettings, RpaSettings, Settings,
};
pub use report::{BatchReport, BatchResults, ConversionOutcome, ERROR_PREFIX};
