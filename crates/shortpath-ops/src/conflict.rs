//! Short name conflict resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use compact_str::{CompactString, format_compact};
use shortpath_core::{LinkError, PathMapping};

/// Outcome of allocating a target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// A name no other source uses.
    Fresh(PathBuf),
    /// The name already belongs to this source.
    Existing(PathBuf),
}

impl Allocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::Fresh(p) | Self::Existing(p) => p,
        }
    }
}

/// Names in the link root, bound to the source each one aliases.
///
/// Keys are lower-cased so two names differing only in case never coexist.
#[derive(Debug, Default)]
pub struct NameIndex {
    names: HashMap<CompactString, PathBuf>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from the names active mappings already use.
    pub fn seed<'a>(mappings: impl IntoIterator<Item = &'a PathMapping>) -> Self {
        let mut index = Self::new();
        for mapping in mappings {
            if let Some(name) = mapping.short_path.file_name() {
                index
                    .names
                    .insert(key(&name.to_string_lossy()), mapping.original_path.clone());
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Find a name under `root` for `source`.
    ///
    /// Tries `base`, then `base_1`, `base_2`, … for up to `max_attempts`
    /// names in total. Names bound to another source are skipped without
    /// touching the file system; a name not in the index is checked once
    /// with `exists` and bound to `source` if free.
    pub fn allocate(
        &mut self,
        root: &Path,
        base: &str,
        source: &Path,
        max_attempts: usize,
        exists: impl Fn(&Path) -> bool,
    ) -> Result<Allocation, LinkError> {
        for attempt in 0..max_attempts {
            let name = if attempt == 0 {
                CompactString::from(base)
            } else {
                format_compact!("{}_{}", base, attempt)
            };
            let candidate = root.join(name.as_str());

            match self.names.get(&key(&name)) {
                Some(bound) if bound == source => return Ok(Allocation::Existing(candidate)),
                Some(_) => continue,
                None => {}
            }

            if exists(&candidate) {
                continue;
            }

            self.names.insert(key(&name), source.to_path_buf());
            return Ok(Allocation::Fresh(candidate));
        }

        Err(LinkError::ConflictExhausted {
            source_path: source.to_path_buf(),
            attempts: max_attempts,
        })
    }
}

fn key(name: &str) -> CompactString {
    CompactString::from(name.to_lowercase())
}
