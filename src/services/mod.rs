//! Services module - conversion workflow on top of the automation host.
//!
//! # Components
//!
//! - [`Converter`]: owns one automation session and converts workbooks:
//!   - Input validation (existence, read access, directory write access, disk space)
//!   - Workbook open with bounded retries
//!   - Per-sheet print layout normalization ([`plan_page_setup`])
//!   - PDF export, output verification, best-effort workbook close
//!   - Idempotent teardown and a scoped lifecycle
//!
//! - [`batch`]: folder and file-list drivers plus the persisted JSON report
//!
//! - [`system`]: OS capabilities ([`HostSystem`]): process table for orphaned
//!   instance cleanup, and free disk space
//!
//! # Usage Example
//!
//! ```ignore
//! use excel2pdf_rpa::host::PowerShellHost;
//! use excel2pdf_rpa::services::{Converter, SysinfoSystem};
//!
//! let converter = Converter::new(
//!     PowerShellHost::from_settings(&settings.excel),
//!     SysinfoSystem::new(),
//!     settings,
//! );
//!
//! let pdf = converter
//!     .scoped(async |c| c.convert(Utf8Path::new("Datos.xlsx"), None).await)
//!     .await?;
//! ```

pub mod batch;
pub mod conversion;
pub mod system;

pub use batch::{BatchRequest, process_file_list, process_folder, run_batch};
pub use conversion::{
    ConversionError, ConvertedPdf, Converter, MIN_FREE_DISK_BYTES, plan_page_setup,
};
pub use system::{CleanupReport, HostSystem, ProcessEntry, SysinfoSystem, SystemError};
