//! excel2pdf - single workbook conversion for RPA schedulers
//!
//! # Usage
//!
//! ```text
//! excel2pdf <LOG_LEVEL> <EXCEL_FILE> [PDF_FILE]
//! ```
//!
//! # Execution Flow
//!
//! 1. Load `rpa_config.json` from the working directory (defaults when absent)
//! 2. Parse arguments; argument errors exit with `rpa.exit_codes.general_error`
//! 3. Initialize logging → `<rpa.log_dir>/excel_to_pdf_rpa.<date>.log` + stdout
//! 4. Convert on a current-thread tokio runtime, closing Excel on every path
//! 5. Exit with the status mapped from the outcome through `rpa.exit_codes`

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use clap::error::ErrorKind;
use excel2pdf_rpa::logging::{parse_log_level, setup_logging};
use excel2pdf_rpa::{
    APP_NAME, Converter, DEFAULT_CONFIG_FILE, PowerShellHost, RpaConfig, Settings, SysinfoSystem,
    VERSION,
};

#[derive(Parser)]
#[command(name = "excel2pdf")]
#[command(about = "Convert one Excel workbook to PDF")]
#[command(version)]
struct Cli {
    /// Log level: DEBUG, INFO, WARNING, ERROR or CRITICAL
    log_level: String,

    /// Workbook to convert
    excel_file: Utf8PathBuf,

    /// Output PDF (defaults to the workbook path with a .pdf extension)
    pdf_file: Option<Utf8PathBuf>,
}

fn main() {
    let config = RpaConfig::load(DEFAULT_CONFIG_FILE);
    let settings = config.settings();
    let codes = settings.rpa.exit_codes;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let informational =
                matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = e.print();
            std::process::exit(if informational {
                codes.success
            } else {
                codes.general_error
            });
        }
    };

    // Logging guard lives inside run() so buffered lines are flushed before exit
    std::process::exit(run(cli, &config, settings));
}

fn run(cli: Cli, config: &RpaConfig, settings: Settings) -> i32 {
    let codes = settings.rpa.exit_codes;

    let level = if parse_log_level(&cli.log_level).is_some() {
        cli.log_level.clone()
    } else {
        settings.rpa.log_level.clone()
    };

    let _guard = match setup_logging(Utf8Path::new(&settings.rpa.log_dir), &level, true) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        }
    };

    tracing::info!("=== Starting {} v{} ===", APP_NAME, VERSION);
    if parse_log_level(&cli.log_level).is_none() {
        tracing::warn!(
            "Unknown log level '{}', using '{}'",
            cli.log_level,
            settings.rpa.log_level
        );
    }
    if let Some(warning) = config.warning() {
        tracing::warn!("{}", warning);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create async runtime: {}", e);
            return codes.general_error;
        }
    };

    let converter = Converter::new(
        PowerShellHost::from_settings(&settings.excel),
        SysinfoSystem::new(),
        settings,
    );

    let result = runtime.block_on(converter.scoped(async |c| {
        c.convert(&cli.excel_file, cli.pdf_file.as_deref()).await
    }));

    match result {
        Ok(pdf) => {
            tracing::info!("Process completed successfully: {}", pdf.path);
            codes.success
        }
        Err(e) => {
            tracing::error!("Error in main process: {}", e);
            codes.for_failure(e.kind())
        }
    }
}
