//! Byte-level progress tracking for package downloads.
//!
//! `Content-Length` is only an estimate for display; correctness never
//! depends on it.

use std::time::{Duration, Instant};

/// Minimum time between two reported snapshots.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// A point-in-time view of a download, suitable for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes received so far
    pub downloaded: u64,

    /// Expected size from `Content-Length`, if the server sent one
    pub total: Option<u64>,

    /// Percentage complete (0-100), only when `total` is known and non-zero
    pub percent: Option<f64>,

    /// Average speed since the download started, in bytes/second
    pub bytes_per_second: u64,
}

/// Throttled download progress tracker.
pub struct DownloadProgress {
    total: Option<u64>,
    downloaded: u64,
    start_time: Instant,
    last_report: Option<Instant>,
    report_interval: Duration,
}

impl DownloadProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self::with_interval(total, REPORT_INTERVAL)
    }

    pub fn with_interval(total: Option<u64>, report_interval: Duration) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            start_time: Instant::now(),
            last_report: None,
            report_interval,
        }
    }

    /// Record `bytes` more; returns a snapshot when one is due.
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressSnapshot> {
        self.downloaded += bytes;

        let now = Instant::now();
        let due = match self.last_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.report_interval,
        };
        if !due {
            return None;
        }

        self.last_report = Some(now);
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let percent = self
            .total
            .map(|total| ((self.downloaded as f64 / total as f64) * 100.0).min(100.0));

        ProgressSnapshot {
            downloaded: self.downloaded,
            total: self.total,
            percent,
            bytes_per_second: self.average_speed(),
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.downloaded as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}
