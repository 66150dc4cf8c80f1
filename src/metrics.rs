// Conversion metrics
//
// Lightweight counters for one run, logged when the converter shuts down

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Per-run conversion metrics
///
/// Uses atomic operations so recording only needs `&self`.
#[derive(Debug)]
pub struct Metrics {
    /// Workbooks exported successfully
    pub workbooks_converted: AtomicUsize,

    /// Workbooks that failed to convert
    pub workbooks_failed: AtomicUsize,

    /// Workbook open attempts that were retried
    pub open_retries: AtomicUsize,

    /// Time spent in successful conversions, in milliseconds
    pub total_conversion_time_ms: AtomicU64,

    /// Bytes of PDF output written
    pub output_bytes: AtomicU64,

    /// Start of the run
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            workbooks_converted: AtomicUsize::new(0),
            workbooks_failed: AtomicUsize::new(0),
            open_retries: AtomicUsize::new(0),
            total_conversion_time_ms: AtomicU64::new(0),
            output_bytes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful conversion
    pub fn record_converted(&self, duration: Duration, bytes: u64) {
        self.workbooks_converted.fetch_add(1, Ordering::Relaxed);
        self.total_conversion_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.output_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed conversion
    pub fn record_failed(&self) {
        self.workbooks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried workbook open
    pub fn record_open_retry(&self) {
        self.open_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn converted(&self) -> usize {
        self.workbooks_converted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.workbooks_failed.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average conversion time per workbook in milliseconds
    pub fn avg_conversion_time_ms(&self) -> f64 {
        let total = self.total_conversion_time_ms.load(Ordering::Relaxed);
        let count = self.converted();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        if self.converted() + self.failed() == 0 {
            return;
        }

        tracing::info!(
            "Workbooks: {} converted, {} failed, {} open retries",
            self.converted(),
            self.failed(),
            self.open_retries.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Conversion time: {:.2}s (avg: {:.2}ms per workbook), output: {:.1}KB, uptime {:.2}s",
            self.total_conversion_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_conversion_time_ms(),
            self.output_bytes.load(Ordering::Relaxed) as f64 / 1024.0,
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
