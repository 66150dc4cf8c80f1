use crate::host::{
    AutomationHost, AutomationSession, HostError, Margins, Orientation, PageSetup, WorkbookInfo,
    WorksheetInfo,
};
use crate::metrics::Metrics;
use crate::models::{
    BatchResults, ConversionOutcome, FailureKind, OrientationPreference, PdfSettings, Settings,
};
use crate::services::system::{HostSystem, cleanup_orphaned_processes};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Minimum free space required at the output location
pub const MIN_FREE_DISK_BYTES: u64 = 100 * 1024 * 1024;

/// Errors that can occur while converting one workbook
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("File not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error("Permission denied for {path}: {reason}")]
    PermissionDenied { path: Utf8PathBuf, reason: String },

    #[error("Insufficient disk space at {path}: {available} bytes free, {required} required")]
    InsufficientDiskSpace {
        path: Utf8PathBuf,
        available: u64,
        required: u64,
    },

    #[error("Microsoft Excel is not installed or not reachable")]
    HostUnavailable,

    #[error("Automation session is not available")]
    NoSession,

    #[error("Failed to open workbook {path} after {attempts} attempt(s): {source}")]
    WorkbookOpen {
        path: Utf8PathBuf,
        attempts: u32,
        #[source]
        source: HostError,
    },

    #[error("Timed out after {after:?} during {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Excel failed during {operation}: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: HostError,
    },

    #[error("PDF was not generated: {0}")]
    OutputMissing(Utf8PathBuf),

    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Classification used for exit-code mapping
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::FileNotFound(_) => FailureKind::FileNotFound,
            Self::PermissionDenied { .. } => FailureKind::Permission,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::HostUnavailable
            | Self::NoSession
            | Self::WorkbookOpen { .. }
            | Self::Host { .. } => FailureKind::HostApplication,
            Self::Io(e) if e.kind() == ErrorKind::NotFound => FailureKind::FileNotFound,
            Self::Io(e) if e.kind() == ErrorKind::PermissionDenied => FailureKind::Permission,
            Self::InsufficientDiskSpace { .. }
            | Self::OutputMissing(_)
            | Self::InvalidPath(_)
            | Self::Io(_) => FailureKind::General,
        }
    }
}

/// A successfully exported PDF
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPdf {
    pub path: Utf8PathBuf,
    pub elapsed: Duration,
    pub bytes: u64,
}

/// Converts workbooks to PDF through one automation session.
///
/// The session is created lazily by the first conversion (or an explicit
/// [`initialize`](Self::initialize)) and lives until [`close`](Self::close).
/// [`scoped`](Self::scoped) runs a body and guarantees the close.
///
/// Every automation call runs under the `excel.timeout_seconds` deadline. When a
/// deadline expires the session is discarded, since its state is unknown; the
/// next conversion starts a fresh one.
pub struct Converter<H: AutomationHost, S: HostSystem> {
    host: H,
    system: S,
    settings: Settings,
    session: Option<H::Session>,
    metrics: Metrics,
}

impl<H: AutomationHost, S: HostSystem> Converter<H, S> {
    pub fn new(host: H, system: S, settings: Settings) -> Self {
        Self {
            host,
            system,
            settings,
            session: None,
            metrics: Metrics::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start the automation session if it is not running yet.
    ///
    /// Sweeps orphaned instances when configured, probes that the host
    /// application can start, then launches the session with UI, alerts and
    /// screen repainting disabled.
    pub async fn initialize(&mut self) -> Result<(), ConversionError> {
        if self.session.is_some() {
            return Ok(());
        }

        let cleanup = &self.settings.cleanup;
        if cleanup.kill_orphaned_excel {
            cleanup_orphaned_processes(
                &mut self.system,
                &cleanup.process_name,
                cleanup.max_excel_processes,
            );
        }

        let limit = self.call_timeout();
        let reachable = tokio::time::timeout(limit, self.host.probe())
            .await
            .unwrap_or(false);
        if !reachable {
            tracing::error!("Excel is not installed or not reachable");
            return Err(ConversionError::HostUnavailable);
        }

        let mut session = within(limit, "launch", self.host.launch()).await?;

        let excel = &self.settings.excel;
        within(limit, "configure application", async {
            session.set_visible(excel.visible).await?;
            session.set_display_alerts(excel.display_alerts).await?;
            session.set_screen_updating(false).await
        })
        .await?;

        self.session = Some(session);
        tracing::info!("Excel initialized");
        Ok(())
    }

    /// Convert one workbook to PDF.
    ///
    /// `output` defaults to the input path with a `.pdf` extension. The opened
    /// workbook is closed without saving on every path out of this call.
    pub async fn convert(
        &mut self,
        input: &Utf8Path,
        output: Option<&Utf8Path>,
    ) -> Result<ConvertedPdf, ConversionError> {
        let result = self.convert_workbook(input, output).await;

        match &result {
            Ok(pdf) => self.metrics.record_converted(pdf.elapsed, pdf.bytes),
            Err(e) => {
                self.metrics.record_failed();
                tracing::error!("Conversion of {} failed: {}", input, e);
            }
        }

        result
    }

    /// Convert each file in order, never stopping on a failure.
    ///
    /// With `output_dir`, each PDF is named after the input's base name inside
    /// it; otherwise it lands next to its input.
    pub async fn convert_batch<P: AsRef<Utf8Path>>(
        &mut self,
        files: &[P],
        output_dir: Option<&Utf8Path>,
    ) -> BatchResults {
        let mut results = BatchResults::new();

        for file in files {
            let input = file.as_ref();
            let output = output_dir.map(|dir| batch_output_path(input, dir));

            let outcome = match self.convert(input, output.as_deref()).await {
                Ok(pdf) => {
                    tracing::info!("OK {} -> {}", input, pdf.path);
                    ConversionOutcome::Converted(pdf.path)
                }
                Err(e) => ConversionOutcome::Failed(e.to_string()),
            };

            results.insert(input.to_string(), outcome);
        }

        results
    }

    /// Quit the host application and return to the uninitialized state.
    ///
    /// Best-effort and idempotent: failures are logged, and calling it without
    /// a live session does nothing.
    pub async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let limit = self.call_timeout();

        match tokio::time::timeout(limit, session.set_screen_updating(true)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Could not re-enable screen updating: {}", e),
            Err(_) => tracing::warn!("Timed out re-enabling screen updating"),
        }

        match tokio::time::timeout(limit, session.quit()).await {
            Ok(Ok(())) => tracing::info!("Excel closed"),
            Ok(Err(e)) => tracing::error!("Error closing Excel: {}", e),
            Err(_) => tracing::error!("Timed out closing Excel after {:?}", limit),
        }

        self.metrics.log_summary();
    }

    /// Run `body` with this converter, then close it exactly once.
    pub async fn scoped<T>(mut self, body: impl AsyncFnOnce(&mut Self) -> T) -> T {
        let output = body(&mut self).await;
        self.close().await;
        output
    }

    async fn convert_workbook(
        &mut self,
        input: &Utf8Path,
        output: Option<&Utf8Path>,
    ) -> Result<ConvertedPdf, ConversionError> {
        let start = Instant::now();

        let input = absolute(input)?;
        validate_input(&input)?;

        let output = absolute(&resolve_output_path(&input, output))?;
        self.check_disk_space(&output)?;

        tracing::info!("Starting conversion: {} -> {}", input, output);

        self.initialize().await?;

        let workbook = match self.open_workbook(&input).await {
            Ok(workbook) => workbook,
            Err(e) => {
                // Excel may hold the file even though the open reported failure
                self.close_workbook().await;
                return Err(e);
            }
        };
        tracing::info!(
            "Workbook opened: {}, sheets: {}",
            workbook.name,
            workbook.sheet_count
        );

        let rendered = self.render_workbook(&workbook, &output).await;
        self.close_workbook().await;
        rendered?;

        let bytes = match tokio::fs::metadata(&output).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Err(ConversionError::OutputMissing(output)),
        };
        let elapsed = start.elapsed();

        tracing::info!("Conversion succeeded: {}", output);
        tracing::info!(
            "Time: {:.2}s, Size: {:.1}KB",
            elapsed.as_secs_f64(),
            bytes as f64 / 1024.0
        );

        Ok(ConvertedPdf {
            path: output,
            elapsed,
            bytes,
        })
    }

    async fn open_workbook(&mut self, input: &Utf8Path) -> Result<WorkbookInfo, ConversionError> {
        let attempts = self.settings.excel.retry_attempts.max(1);
        let delay = retry_delay(self.settings.excel.retry_delay);
        let limit = self.call_timeout();

        let mut attempt = 1;
        loop {
            let session = self.session.as_mut().ok_or(ConversionError::NoSession)?;
            let result = tokio::time::timeout(limit, session.open_workbook(input)).await;

            match result {
                Ok(Ok(info)) => return Ok(info),
                Ok(Err(e)) if attempt < attempts => {
                    tracing::warn!(
                        "Attempt {} failed, retrying in {:.1}s: {}",
                        attempt,
                        delay.as_secs_f64(),
                        e
                    );
                    self.metrics.record_open_retry();
                    self.close_workbook().await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(Err(source)) => {
                    return Err(ConversionError::WorkbookOpen {
                        path: input.to_path_buf(),
                        attempts,
                        source,
                    });
                }
                Err(_) => {
                    self.discard_session();
                    return Err(ConversionError::Timeout {
                        operation: "open workbook",
                        after: limit,
                    });
                }
            }
        }
    }

    async fn render_workbook(
        &mut self,
        workbook: &WorkbookInfo,
        output: &Utf8Path,
    ) -> Result<(), ConversionError> {
        let result = self.configure_and_export(workbook, output).await;
        if matches!(result, Err(ConversionError::Timeout { .. })) {
            self.discard_session();
        }
        result
    }

    async fn configure_and_export(
        &mut self,
        workbook: &WorkbookInfo,
        output: &Utf8Path,
    ) -> Result<(), ConversionError> {
        let limit = self.call_timeout();
        let pdf = self.settings.pdf.clone();
        let session = self.session.as_mut().ok_or(ConversionError::NoSession)?;

        let margin = within(
            limit,
            "margin conversion",
            session.centimeters_to_points(pdf.margins_cm),
        )
        .await?;
        let header_footer = within(
            limit,
            "margin conversion",
            session.centimeters_to_points(pdf.header_footer_margin_cm),
        )
        .await?;

        for index in 0..workbook.sheet_count {
            let sheet = within(limit, "worksheet inspection", session.worksheet(index)).await?;
            tracing::debug!("Configuring sheet: {}", sheet.name);

            let setup = plan_page_setup(&sheet, &pdf, margin, header_footer);
            within(
                limit,
                "page setup",
                session.apply_page_setup(index, &setup),
            )
            .await?;
        }

        tracing::info!("Exporting to PDF...");
        within(limit, "PDF export", session.export_pdf(output)).await
    }

    async fn close_workbook(&mut self) {
        let limit = self.call_timeout();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let result = tokio::time::timeout(limit, session.close_workbook()).await;
        match result {
            Ok(Ok(())) => tracing::debug!("Workbook closed"),
            Ok(Err(e)) => tracing::warn!("Failed to close workbook: {}", e),
            Err(_) => {
                tracing::warn!("Timed out closing workbook");
                self.discard_session();
            }
        }
    }

    fn discard_session(&mut self) {
        if self.session.take().is_some() {
            tracing::warn!("Discarding automation session in an unknown state");
        }
    }

    fn check_disk_space(&mut self, output: &Utf8Path) -> Result<(), ConversionError> {
        let dir = output.parent().unwrap_or(output);

        match self.system.available_space(dir) {
            Some(available) if available < MIN_FREE_DISK_BYTES => {
                Err(ConversionError::InsufficientDiskSpace {
                    path: dir.to_path_buf(),
                    available,
                    required: MIN_FREE_DISK_BYTES,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!("Could not determine free disk space at {}", dir);
                Ok(())
            }
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.excel.timeout_seconds.max(1))
    }
}

impl<H: AutomationHost, S: HostSystem> Drop for Converter<H, S> {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::warn!("Converter dropped without close; terminating automation session");
        }
    }
}

/// Run one automation call under a deadline
async fn within<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, HostError>>,
) -> Result<T, ConversionError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|source| ConversionError::Host { operation, source }),
        Err(_) => Err(ConversionError::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Plan the print layout of one worksheet.
///
/// `margin_points` and `header_footer_points` are already in the host's unit.
pub fn plan_page_setup(
    sheet: &WorksheetInfo,
    pdf: &PdfSettings,
    margin_points: f64,
    header_footer_points: f64,
) -> PageSetup {
    let orientation = match pdf.orientation() {
        OrientationPreference::Auto => {
            Orientation::for_used_range(sheet.used_rows, sheet.used_columns)
        }
        OrientationPreference::Portrait => Orientation::Portrait,
        OrientationPreference::Landscape => Orientation::Landscape,
    };

    let print_area = if sheet.print_area.trim().is_empty() {
        Some(sheet.used_address.clone())
    } else {
        None
    };

    PageSetup {
        orientation,
        fit_to_pages_wide: pdf.fit_to_width.then_some(1),
        fit_to_pages_tall: None,
        margins: Margins {
            left: margin_points,
            right: margin_points,
            top: margin_points,
            bottom: margin_points,
            header: header_footer_points,
            footer: header_footer_points,
        },
        center_horizontally: true,
        center_vertically: false,
        print_quality: pdf.default_quality,
        print_area,
    }
}

/// Output path for a single conversion: explicit, or the input with `.pdf`
pub fn resolve_output_path(input: &Utf8Path, output: Option<&Utf8Path>) -> Utf8PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("pdf"),
    }
}

/// Output path for a batch item: `<dir>/<input stem>.pdf`
pub fn batch_output_path(input: &Utf8Path, dir: &Utf8Path) -> Utf8PathBuf {
    let stem = input.file_stem().unwrap_or("workbook");
    dir.join(format!("{}.pdf", stem))
}

/// Check the input exists and is readable, and that its directory is writable.
pub fn validate_input(path: &Utf8Path) -> Result<(), ConversionError> {
    if !path.is_file() {
        return Err(ConversionError::FileNotFound(path.to_path_buf()));
    }

    let denied = |target: &Utf8Path, e: std::io::Error| match e.kind() {
        ErrorKind::NotFound => ConversionError::FileNotFound(target.to_path_buf()),
        _ => ConversionError::PermissionDenied {
            path: target.to_path_buf(),
            reason: e.to_string(),
        },
    };

    let mut byte = [0u8; 1];
    fs::File::open(path)
        .and_then(|mut file| file.read(&mut byte))
        .map_err(|e| denied(path, e))?;

    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let probe = dir.join(format!(
        ".write_probe_{}_{}.tmp",
        std::process::id(),
        nanos
    ));

    fs::write(&probe, b"test").map_err(|e| denied(dir, e))?;
    fs::remove_file(&probe).map_err(|e| denied(dir, e))?;

    Ok(())
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, ConversionError> {
    let absolute = std::path::absolute(path)?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| ConversionError::InvalidPath(p.display().to_string()))
}

fn retry_delay(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
}
