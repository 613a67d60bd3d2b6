//! JWalk-based over-long path scanner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jwalk::{DirEntryIter, Parallelism, WalkDir};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shortpath_core::{
    ObjectKind, ScanError, ScanRecord, ScanWarning, ShortenConfig, WarningKind, path_length,
};

use crate::filter::ExcludeFilter;
use crate::progress::{ProgressTracker, ScanProgress};

/// Entries between progress broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

/// Finds paths longer than a threshold using jwalk for parallel directory reads.
pub struct PathScanner {
    max_path_length: usize,
    exclude: Arc<ExcludeFilter>,
    max_depth: Option<usize>,
    threads: usize,
    progress_tx: broadcast::Sender<ScanProgress>,
    cancel: CancellationToken,
}

impl PathScanner {
    /// Create a scanner with a length threshold and exclusion filter.
    pub fn new(max_path_length: usize, exclude: ExcludeFilter) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            max_path_length,
            exclude: Arc::new(exclude),
            max_depth: None,
            threads: 0,
            progress_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a scanner from run configuration.
    pub fn from_config(config: &ShortenConfig) -> Result<Self, ScanError> {
        let exclude = ExcludeFilter::new(&config.exclude_patterns)?;
        Ok(Self::new(config.max_path_length, exclude).with_max_depth(config.max_depth))
    }

    /// Limit recursion depth (None = unlimited).
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of threads for directory reads (0 = auto-detect).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Stop yielding candidates once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Start scanning below `root`.
    ///
    /// The returned [`Scan`] is lazy: directories are read as candidates
    /// are pulled from it. The root itself is never a candidate.
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<Scan, ScanError> {
        let root = root.as_ref();
        // `absolute` keeps the path's own spelling; canonicalizing would add
        // a verbatim prefix on Windows and change every length.
        let root = std::path::absolute(root).map_err(|e| ScanError::io(root, e))?;
        let metadata = std::fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        let parallelism = match self.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let prune = Arc::clone(&self.exclude);
        let walker = WalkDir::new(&root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .process_read_dir(move |_depth, _path, _state, children| {
                for entry in children.iter_mut().flatten() {
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let path = entry.path();
                    if prune.is_excluded(&path) || is_reparse_point(&path) {
                        entry.read_children_path = None;
                    }
                }
            });

        debug!(root = %root.display(), threshold = self.max_path_length, "starting scan");

        Ok(Scan {
            entries: walker.into_iter(),
            root,
            max_path_length: self.max_path_length,
            exclude: Arc::clone(&self.exclude),
            tracker: ProgressTracker::new(),
            warnings: Vec::new(),
            progress_tx: self.progress_tx.clone(),
            cancel: self.cancel.clone(),
            finished: false,
        })
    }
}

/// A running scan: a lazy, non-restartable sequence of candidates in
/// traversal order.
///
/// Unreadable subtrees are recorded as warnings and skipped.
pub struct Scan {
    entries: DirEntryIter<((), ())>,
    root: PathBuf,
    max_path_length: usize,
    exclude: Arc<ExcludeFilter>,
    tracker: ProgressTracker,
    warnings: Vec<ScanWarning>,
    progress_tx: broadcast::Sender<ScanProgress>,
    cancel: CancellationToken,
    finished: bool,
}

impl Scan {
    /// The absolute root being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Take the collected warnings, leaving none behind.
    pub fn take_warnings(&mut self) -> Vec<ScanWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> ScanProgress {
        self.tracker.snapshot()
    }

    fn warn(&mut self, warning: ScanWarning) {
        warn!(path = %warning.path.display(), "{}", warning.message);
        self.tracker.record_warning();
        self.warnings.push(warning);
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let progress = self.tracker.snapshot();
            debug!(
                entries = progress.entries_visited,
                candidates = progress.candidates_found,
                warnings = progress.warnings_count,
                "scan finished"
            );
            let _ = self.progress_tx.send(progress);
        }
    }
}

impl Iterator for Scan {
    type Item = ScanRecord;

    fn next(&mut self) -> Option<ScanRecord> {
        loop {
            if self.cancel.is_cancelled() {
                if !self.finished {
                    debug!(root = %self.root.display(), "scan cancelled");
                }
                self.finish();
                return None;
            }

            let Some(result) = self.entries.next() else {
                self.finish();
                return None;
            };

            let mut entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::from_io(path, io),
                        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    self.warn(warning);
                    continue;
                }
            };

            let path = entry.path();

            // jwalk attaches a failed directory read to the directory's own entry.
            if let Some(err) = entry.read_children_error.take() {
                let failed = err.path().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
                let warning = match err.io_error() {
                    Some(io) => ScanWarning::from_io(failed, io),
                    None => ScanWarning::new(failed, err.to_string(), WarningKind::ReadError),
                };
                self.warn(warning);
            }

            if self.tracker.record_entry(&path) % PROGRESS_INTERVAL == 0 {
                let _ = self.progress_tx.send(self.tracker.snapshot());
            }

            // Links are aliases themselves and never candidates.
            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                ObjectKind::Directory
            } else if file_type.is_file() {
                ObjectKind::File
            } else {
                continue;
            };

            if path_length(&path) <= self.max_path_length {
                continue;
            }
            if self.exclude.is_excluded(&path) {
                debug!(path = %path.display(), "excluded");
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    self.warn(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
            };

            let size = if kind.is_file() { metadata.len() } else { 0 };
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            self.tracker.record_candidate();
            return Some(
                ScanRecord::new(path, kind)
                    .with_size(size)
                    .with_modified(modified),
            );
        }
    }
}

/// Check for a reparse point (junction, mount point, symlink) on Windows.
#[cfg(windows)]
fn is_reparse_point(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    std::fs::symlink_metadata(path)
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

// Unix symlinks are reported with a link file type and never descended.
#[cfg(not(windows))]
fn is_reparse_point(_path: &Path) -> bool {
    false
}
