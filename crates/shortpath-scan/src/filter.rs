//! Exclusion patterns.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use shortpath_core::ScanError;

/// Compiled set of exclusion globs, matched against full paths.
///
/// Matching is case-insensitive on Windows, where the file system is.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    set: GlobSet,
    len: usize,
}

impl ExcludeFilter {
    /// Compile a list of glob patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(cfg!(windows))
                .literal_separator(false)
                .build()
                .map_err(|e| ScanError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.kind().to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            set,
            len: patterns.len(),
        })
    }

    /// A filter that excludes nothing.
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            len: 0,
        }
    }

    /// Check if a path matches any pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.len > 0 && self.set.is_match(path)
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
