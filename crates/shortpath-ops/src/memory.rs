//! In-memory link creator with failure injection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use shortpath_core::{LinkError, LinkType};

use crate::creator::{LinkCreator, RemoveOutcome};

/// A link recorded by [`MemoryLinkCreator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLink {
    pub target: PathBuf,
    pub link_type: LinkType,
}

/// Keeps links in a map instead of on disk.
///
/// Paths can be marked as occupied by unrelated objects, and creation or
/// removal at specific paths can be made to fail.
#[derive(Debug)]
pub struct MemoryLinkCreator {
    links: DashMap<PathBuf, MemoryLink>,
    dirs: DashSet<PathBuf>,
    occupied: DashSet<PathBuf>,
    fail_create: DashSet<PathBuf>,
    fail_remove: DashSet<PathBuf>,
    same_volume: AtomicBool,
    delay: Option<Duration>,
}

impl Default for MemoryLinkCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLinkCreator {
    pub fn new() -> Self {
        Self {
            links: DashMap::new(),
            dirs: DashSet::new(),
            occupied: DashSet::new(),
            fail_create: DashSet::new(),
            fail_remove: DashSet::new(),
            same_volume: AtomicBool::new(true),
            delay: None,
        }
    }

    /// Sleep this long inside every create call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pretend something unrelated exists at `path`.
    pub fn occupy(&self, path: impl Into<PathBuf>) {
        self.occupied.insert(path.into());
    }

    /// Make creating a link at `path` fail.
    pub fn fail_create_at(&self, path: impl Into<PathBuf>) {
        self.fail_create.insert(path.into());
    }

    /// Make removing the link at `path` fail.
    pub fn fail_remove_at(&self, path: impl Into<PathBuf>) {
        self.fail_remove.insert(path.into());
    }

    pub fn set_same_volume(&self, same: bool) {
        self.same_volume.store(same, Ordering::SeqCst);
    }

    pub fn link(&self, path: &Path) -> Option<MemoryLink> {
        self.links.get(path).map(|l| l.value().clone())
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Forget a link as if someone deleted it by hand.
    pub fn forget(&self, path: &Path) {
        self.links.remove(path);
    }

    fn insert(&self, link: &Path, target: &Path, link_type: LinkType) -> Result<(), LinkError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_create.contains(link) {
            return Err(LinkError::platform(
                "create link",
                link,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        if self.exists(link) {
            return Err(LinkError::platform(
                "create link",
                link,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        self.links.insert(
            link.to_path_buf(),
            MemoryLink {
                target: target.to_path_buf(),
                link_type,
            },
        );
        Ok(())
    }
}

impl LinkCreator for MemoryLinkCreator {
    fn create_junction(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        self.insert(link, target, LinkType::Junction)
    }

    fn create_symbolic_link(
        &self,
        link: &Path,
        target: &Path,
        _is_directory: bool,
    ) -> Result<(), LinkError> {
        self.insert(link, target, LinkType::SymbolicLink)
    }

    fn create_hard_link(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        self.insert(link, target, LinkType::HardLink)
    }

    fn remove_link(
        &self,
        link: &Path,
        link_type: LinkType,
        source: &Path,
    ) -> Result<RemoveOutcome, LinkError> {
        if self.fail_remove.contains(link) {
            return Err(LinkError::platform(
                "remove link",
                link,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }

        let matches = match self.links.get(link) {
            Some(existing) => existing.target == source && existing.link_type == link_type,
            None if self.occupied.contains(link) || self.dirs.contains(link) => false,
            None => return Ok(RemoveOutcome::AlreadyAbsent),
        };
        if !matches {
            return Err(LinkError::NotAnAlias {
                path: link.to_path_buf(),
                source_path: source.to_path_buf(),
            });
        }

        self.links.remove(link);
        Ok(RemoveOutcome::Removed)
    }

    fn is_alias_of(&self, link: &Path, link_type: LinkType, source: &Path) -> bool {
        self.links
            .get(link)
            .is_some_and(|l| l.target == source && l.link_type == link_type)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), LinkError> {
        for ancestor in dir.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                self.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.links.contains_key(path) || self.occupied.contains(path) || self.dirs.contains(path)
    }

    fn same_volume(&self, _a: &Path, _b: &Path) -> bool {
        self.same_volume.load(Ordering::SeqCst)
    }
}
