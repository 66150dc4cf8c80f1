//! excel2pdf-batch - convert a folder or a list of workbooks
//!
//! ```text
//! excel2pdf-batch <FOLDER> [OUTPUT_FOLDER]
//! excel2pdf-batch --list <FILE_LIST> [OUTPUT_FOLDER]
//! ```
//!
//! Per-file failures are recorded in the JSON report written to
//! `batch.report_dir`; the process exits 1 only when the batch itself fails.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use clap::error::ErrorKind;
use excel2pdf_rpa::logging::setup_logging;
use excel2pdf_rpa::services::run_batch;
use excel2pdf_rpa::{
    APP_NAME, BatchRequest, Converter, DEFAULT_CONFIG_FILE, PowerShellHost, RpaConfig, Settings,
    SysinfoSystem, VERSION,
};

#[derive(Parser)]
#[command(name = "excel2pdf-batch")]
#[command(about = "Convert a folder or a list of Excel workbooks to PDF")]
#[command(version)]
#[command(
    override_usage = "excel2pdf-batch <FOLDER> [OUTPUT_FOLDER]\n       excel2pdf-batch --list <FILE_LIST> [OUTPUT_FOLDER]"
)]
struct Cli {
    /// JSON array of workbook paths to convert
    #[arg(long, value_name = "FILE_LIST")]
    list: Option<Utf8PathBuf>,

    /// Folder to scan, or the output folder when --list is given
    #[arg(value_name = "FOLDER")]
    first: Option<Utf8PathBuf>,

    /// Output folder
    #[arg(value_name = "OUTPUT_FOLDER")]
    second: Option<Utf8PathBuf>,
}

impl Cli {
    fn into_request(self, pattern: &str) -> Result<BatchRequest> {
        match (self.list, self.first, self.second) {
            (Some(list_file), output_dir, None) => Ok(BatchRequest::List {
                list_file,
                output_dir,
            }),
            (Some(_), _, Some(extra)) => bail!("Unexpected argument after --list: {}", extra),
            (None, Some(folder), output_dir) => Ok(BatchRequest::Folder {
                folder,
                output_dir,
                pattern: pattern.to_string(),
            }),
            (None, None, _) => bail!("A folder or --list <FILE_LIST> is required"),
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let informational =
                matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = e.print();
            std::process::exit(if informational { 0 } else { 1 });
        }
    };

    let config = RpaConfig::load(DEFAULT_CONFIG_FILE);
    let settings = config.settings();

    let guard = match setup_logging(
        Utf8Path::new(&settings.rpa.log_dir),
        &settings.rpa.log_level,
        true,
    ) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        }
    };

    tracing::info!("=== Starting {} v{} (batch) ===", APP_NAME, VERSION);
    if let Some(warning) = config.warning() {
        tracing::warn!("{}", warning);
    }

    let code = match run(cli, settings) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Error in batch processing: {:#}", e);
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}

fn run(cli: Cli, settings: Settings) -> Result<()> {
    let request = cli.into_request(&settings.batch.pattern)?;
    let report_dir = Utf8PathBuf::from(&settings.batch.report_dir);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let converter = Converter::new(
        PowerShellHost::from_settings(&settings.excel),
        SysinfoSystem::new(),
        settings,
    );

    let (report, path) = runtime.block_on(run_batch(converter, &request, &report_dir))?;
    tracing::info!(
        "Batch finished: {}/{} converted, report at {}",
        report.succeeded,
        report.total,
        path
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("excel2pdf-batch").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_folder_request() {
        let request = parse(&["in", "out"]).into_request("*.xlsx").unwrap();
        assert_eq!(
            request,
            BatchRequest::Folder {
                folder: Utf8PathBuf::from("in"),
                output_dir: Some(Utf8PathBuf::from("out")),
                pattern: "*.xlsx".to_string(),
            }
        );
    }

    #[test]
    fn test_list_request() {
        let request = parse(&["--list", "files.json", "out"])
            .into_request("*.xlsx")
            .unwrap();
        assert_eq!(
            request,
            BatchRequest::List {
                list_file: Utf8PathBuf::from("files.json"),
                output_dir: Some(Utf8PathBuf::from("out")),
            }
        );

        let request = parse(&["--list", "files.json"]).into_request("*.xlsx").unwrap();
        assert!(matches!(request, BatchRequest::List { output_dir: None, .. }));
    }

    #[test]
    fn test_invalid_requests() {
        assert!(parse(&[]).into_request("*.xlsx").is_err());
        assert!(
            parse(&["--list", "files.json", "out", "extra"])
                .into_request("*.xlsx")
                .is_err()
        );
    }
}
