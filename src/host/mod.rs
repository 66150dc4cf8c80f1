//! Automation host abstraction.
//!
//! The converter never talks to the spreadsheet application directly. It drives an
//! [`AutomationHost`], which launches [`AutomationSession`]s: one live application
//! instance with at most one open workbook. The production backend is
//! [`PowerShellHost`], which keeps an `Excel.Application` COM object alive inside a
//! PowerShell process and sends it one statement per request.
//!
//! Sessions are used from a single task; the futures they return are not `Send`.

pub mod powershell;

use camino::Utf8Path;
use thiserror::Error;

pub use powershell::PowerShellHost;

/// Errors reported by an automation backend
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to start automation process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Automation I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Automation session closed unexpectedly")]
    Closed,

    #[error("No workbook is open")]
    NoWorkbook,

    #[error("{0}")]
    Automation(String),

    #[error("Unexpected automation response: {0}")]
    Protocol(String),
}

/// Page orientation as understood by the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Landscape when the used range is wider than it is tall or has more than
    /// [`WIDE_SHEET_COLUMNS`] columns.
    pub fn for_used_range(rows: u32, columns: u32) -> Self {
        if columns > rows || columns > WIDE_SHEET_COLUMNS {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }

    /// `XlPageOrientation` value
    pub fn code(self) -> u8 {
        match self {
            Self::Portrait => 1,
            Self::Landscape => 2,
        }
    }
}

/// Column count above which a sheet always prints landscape
pub const WIDE_SHEET_COLUMNS: u32 = 10;

/// Opened workbook summary
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookInfo {
    pub name: String,
    pub sheet_count: usize,
}

/// Worksheet facts needed to plan its print layout
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetInfo {
    pub name: String,
    pub used_rows: u32,
    pub used_columns: u32,
    /// Address of the used range, e.g. `$A$1:$F$40`
    pub used_address: String,
    /// Current print area; empty when none is set
    pub print_area: String,
}

/// Margins in the host's native unit (points)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub header: f64,
    pub footer: f64,
}

/// Print layout applied to one worksheet before export
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub orientation: Orientation,
    /// `Some(1)` fits the sheet to one page wide; `None` leaves the width free
    pub fit_to_pages_wide: Option<u32>,
    /// `None` leaves the height free
    pub fit_to_pages_tall: Option<u32>,
    pub margins: Margins,
    pub center_horizontally: bool,
    pub center_vertically: bool,
    pub print_quality: u32,
    /// Print area to assign; `None` keeps the existing one
    pub print_area: Option<String>,
}

/// Launches sessions of the host application.
#[allow(async_fn_in_trait)]
pub trait AutomationHost {
    type Session: AutomationSession;

    /// Start a new application instance
    async fn launch(&self) -> Result<Self::Session, HostError>;

    /// Check the application can be started by launching and quitting it
    async fn probe(&self) -> bool {
        match self.launch().await {
            Ok(session) => {
                if let Err(e) = session.quit().await {
                    tracing::debug!("Probe session did not quit cleanly: {}", e);
                }
                true
            }
            Err(e) => {
                tracing::debug!("Host application probe failed: {}", e);
                false
            }
        }
    }
}

/// One live host application instance.
///
/// Worksheet indexes are zero-based.
#[allow(async_fn_in_trait)]
pub trait AutomationSession {
    async fn set_visible(&mut self, visible: bool) -> Result<(), HostError>;

    async fn set_display_alerts(&mut self, enabled: bool) -> Result<(), HostError>;

    async fn set_screen_updating(&mut self, enabled: bool) -> Result<(), HostError>;

    /// Convert centimeters to the host's native page unit
    async fn centimeters_to_points(&mut self, centimeters: f64) -> Result<f64, HostError>;

    async fn open_workbook(&mut self, path: &Utf8Path) -> Result<WorkbookInfo, HostError>;

    async fn worksheet(&mut self, index: usize) -> Result<WorksheetInfo, HostError>;

    async fn apply_page_setup(&mut self, index: usize, setup: &PageSetup) -> Result<(), HostError>;

    /// Export the open workbook in the fixed-layout PDF format
    async fn export_pdf(&mut self, path: &Utf8Path) -> Result<(), HostError>;

    /// Close the open workbook without saving. Does nothing when none is open.
    async fn close_workbook(&mut self) -> Result<(), HostError>;

    /// Quit the application and release the session
    async fn quit(self) -> Result<(), HostError>;
}
