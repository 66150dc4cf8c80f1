use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix marking a failed entry in batch results and reports
pub const ERROR_PREFIX: &str = "ERROR:";

/// Outcome of converting one input file
///
/// Serialized as a bare string: the output path on success, or
/// `ERROR: <reason>` on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(Utf8PathBuf),
    Failed(String),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converted(_))
    }

    pub fn output_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Converted(path) => Some(path),
            Self::Failed(_) => None,
        }
    }

    /// Report form of the outcome
    pub fn to_report_string(&self) -> String {
        match self {
            Self::Converted(path) => path.to_string(),
            Self::Failed(reason) => format!("{} {}", ERROR_PREFIX, reason),
        }
    }
}

impl Serialize for ConversionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_report_string())
    }
}

impl<'de> Deserialize<'de> for ConversionOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(match value.strip_prefix(ERROR_PREFIX) {
            Some(reason) => Self::Failed(reason.trim_start().to_string()),
            None => Self::Converted(Utf8PathBuf::from(value)),
        })
    }
}

/// Per-file outcomes keyed by input path, in processing order
pub type BatchResults = IndexMap<String, ConversionOutcome>;

/// Outcome of a batch run.
///
/// Only `results` is persisted; the counts are logged.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Unix timestamp (seconds) of report creation
    pub generated_at: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: BatchResults,
}

impl BatchReport {
    pub fn new(results: BatchResults) -> Self {
        let generated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let succeeded = results.values().filter(|r| r.is_success()).count();

        Self {
            generated_at,
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// File name used when persisting this report
    pub fn file_name(&self) -> String {
        format!("batch_report_{}.json", self.generated_at)
    }

    /// Write the input -> outcome mapping as pretty-printed JSON into `dir`.
    ///
    /// # Returns
    /// The path of the written report
    pub fn write_to(&self, dir: &Utf8Path) -> Result<Utf8PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create report directory: {}", dir))?;
        }

        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(&self.results)
            .context("Failed to serialize batch report")?;

        fs::write(&path, json).with_context(|| format!("Failed to write batch report: {}", path))?;

        tracing::info!("Report saved to: {}", path);
        Ok(path)
    }

    /// Log the total / succeeded / failed counts
    pub fn log_summary(&self) {
        tracing::info!("=== Summary ===");
        tracing::info!("Total files: {}", self.total);
        tracing::info!("Succeeded: {}", self.succeeded);
        tracing::info!("With errors: {}", self.failed);
    }
}
