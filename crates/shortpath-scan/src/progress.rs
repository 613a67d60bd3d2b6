//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of file system entries visited so far.
    pub entries_visited: u64,
    /// Number of candidates emitted so far.
    pub candidates_found: u64,
    /// Number of non-fatal warnings.
    pub warnings_count: u64,
    /// Current path being scanned.
    pub current_path: PathBuf,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            entries_visited: 0,
            candidates_found: 0,
            warnings_count: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in entries per second.
    pub fn entries_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.entries_visited as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters with timing, snapshotted into [`ScanProgress`].
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    entries_visited: u64,
    candidates_found: u64,
    warnings_count: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            entries_visited: 0,
            candidates_found: 0,
            warnings_count: 0,
            current_path: PathBuf::new(),
        }
    }

    /// Record a visited entry. Returns the running count.
    pub fn record_entry(&mut self, path: &std::path::Path) -> u64 {
        self.entries_visited += 1;
        self.current_path = path.to_path_buf();
        self.entries_visited
    }

    pub fn record_candidate(&mut self) {
        self.candidates_found += 1;
    }

    pub fn record_warning(&mut self) {
        self.warnings_count += 1;
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            entries_visited: self.entries_visited,
            candidates_found: self.candidates_found,
            warnings_count: self.warnings_count,
            current_path: self.current_path.clone(),
            elapsed: self.start_time.elapsed(),
        }
    }
}
