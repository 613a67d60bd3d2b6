//! Platform link primitives.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use shortpath_core::{LinkError, LinkType, ObjectKind};
use tracing::debug;

use crate::naming::normalize;

/// Result of removing an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The alias was there and has been removed.
    Removed,
    /// Nothing was at the alias path.
    AlreadyAbsent,
}

/// Creates and removes aliases.
///
/// `link` is always the alias being created or removed and `target` the
/// original object it points at. Implementations must never modify or
/// delete the original.
pub trait LinkCreator: Send + Sync {
    fn create_junction(&self, link: &Path, target: &Path) -> Result<(), LinkError>;

    fn create_symbolic_link(
        &self,
        link: &Path,
        target: &Path,
        is_directory: bool,
    ) -> Result<(), LinkError>;

    fn create_hard_link(&self, link: &Path, target: &Path) -> Result<(), LinkError>;

    /// Remove the alias at `link` after checking it still aliases `source`.
    fn remove_link(
        &self,
        link: &Path,
        link_type: LinkType,
        source: &Path,
    ) -> Result<RemoveOutcome, LinkError>;

    /// Check if `link` is a live alias of `source` of the given type.
    fn is_alias_of(&self, link: &Path, link_type: LinkType, source: &Path) -> bool;

    fn create_dir_all(&self, dir: &Path) -> Result<(), LinkError>;

    /// Check if anything, including a dangling link, occupies `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Check if `a` and `b` live on the same volume.
    fn same_volume(&self, a: &Path, b: &Path) -> bool;

    /// Create an alias of the given type.
    fn create(
        &self,
        link_type: LinkType,
        link: &Path,
        target: &Path,
        kind: ObjectKind,
    ) -> Result<(), LinkError> {
        match link_type {
            LinkType::Junction => self.create_junction(link, target),
            LinkType::SymbolicLink => self.create_symbolic_link(link, target, kind.is_dir()),
            LinkType::HardLink => self.create_hard_link(link, target),
        }
    }
}

/// Native file system links.
///
/// Outside Windows there are no junctions; a directory symbolic link is
/// created in their place.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLinkCreator;

impl FsLinkCreator {
    pub fn new() -> Self {
        Self
    }
}

impl LinkCreator for FsLinkCreator {
    fn create_junction(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        #[cfg(windows)]
        let result = junction::create(target, link);
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(target, link);
        #[cfg(not(any(windows, unix)))]
        let result = Err(io::Error::from(io::ErrorKind::Unsupported));

        result.map_err(|e| LinkError::platform("create junction", link, e))
    }

    fn create_symbolic_link(
        &self,
        link: &Path,
        target: &Path,
        is_directory: bool,
    ) -> Result<(), LinkError> {
        #[cfg(windows)]
        let result = if is_directory {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        #[cfg(unix)]
        let result = {
            let _ = is_directory;
            std::os::unix::fs::symlink(target, link)
        };
        #[cfg(not(any(windows, unix)))]
        let result = {
            let _ = is_directory;
            Err(io::Error::from(io::ErrorKind::Unsupported))
        };

        result.map_err(|e| LinkError::platform("create symbolic link", link, e))
    }

    fn create_hard_link(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        fs::hard_link(target, link).map_err(|e| LinkError::platform("create hard link", link, e))
    }

    fn remove_link(
        &self,
        link: &Path,
        link_type: LinkType,
        source: &Path,
    ) -> Result<RemoveOutcome, LinkError> {
        let meta = match fs::symlink_metadata(link) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RemoveOutcome::AlreadyAbsent),
            Err(e) => return Err(LinkError::platform("inspect alias", link, e)),
        };

        let not_an_alias = || LinkError::NotAnAlias {
            path: link.to_path_buf(),
            source_path: source.to_path_buf(),
        };

        match link_type {
            LinkType::Junction | LinkType::SymbolicLink => {
                if !meta.file_type().is_symlink() || !link_points_to(link, link_type, source) {
                    return Err(not_an_alias());
                }
                remove_link_entry(link)?;
            }
            LinkType::HardLink => {
                if !meta.is_file() {
                    return Err(not_an_alias());
                }
                let source_meta = match fs::metadata(source) {
                    Ok(m) => m,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(LinkError::SourceMissing {
                            path: link.to_path_buf(),
                            source_path: source.to_path_buf(),
                        });
                    }
                    Err(e) => return Err(LinkError::platform("inspect source", source, e)),
                };
                if !same_object(link, &meta, source, &source_meta) {
                    return Err(not_an_alias());
                }
                fs::remove_file(link).map_err(|e| LinkError::platform("remove hard link", link, e))?;
            }
        }

        debug!(alias = %link.display(), %link_type, "Removed alias");
        Ok(RemoveOutcome::Removed)
    }

    fn is_alias_of(&self, link: &Path, link_type: LinkType, source: &Path) -> bool {
        let Ok(meta) = fs::symlink_metadata(link) else {
            return false;
        };
        match link_type {
            LinkType::Junction | LinkType::SymbolicLink => {
                meta.file_type().is_symlink() && link_points_to(link, link_type, source)
            }
            LinkType::HardLink => {
                meta.is_file()
                    && fs::metadata(source)
                        .map(|source_meta| same_object(link, &meta, source, &source_meta))
                        .unwrap_or(false)
            }
        }
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), LinkError> {
        fs::create_dir_all(dir).map_err(|e| LinkError::platform("create directory", dir, e))
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn same_volume(&self, a: &Path, b: &Path) -> bool {
        same_volume(a, b)
    }
}

/// Removes a symlink or junction entry without following it.
fn remove_link_entry(link: &Path) -> Result<(), LinkError> {
    #[cfg(windows)]
    let result = fs::remove_file(link).or_else(|_| fs::remove_dir(link));
    #[cfg(not(windows))]
    let result = fs::remove_file(link);

    result.map_err(|e| LinkError::platform("remove link", link, e))
}

#[cfg(windows)]
fn link_points_to(link: &Path, link_type: LinkType, source: &Path) -> bool {
    let target = if link_type == LinkType::Junction {
        junction::get_target(link)
    } else {
        fs::read_link(link)
    };
    target
        .map(|target| same_location(&target, source))
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn link_points_to(link: &Path, _link_type: LinkType, source: &Path) -> bool {
    fs::read_link(link)
        .map(|target| same_location(&target, source))
        .unwrap_or(false)
}

/// Compare two spellings of a path, ignoring NT and verbatim prefixes.
fn same_location(a: &Path, b: &Path) -> bool {
    let strip = |p: &Path| {
        let n = normalize(p);
        match n.strip_prefix("/??/").or_else(|| n.strip_prefix("/?/")) {
            Some(rest) => rest.to_string(),
            None => n,
        }
    };
    strip(a) == strip(b)
}

#[cfg(unix)]
fn same_object(_a: &Path, a: &fs::Metadata, _b: &Path, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

// Volume serial number and file index from the open handles.
#[cfg(windows)]
fn same_object(a: &Path, _a: &fs::Metadata, b: &Path, _b: &fs::Metadata) -> bool {
    same_file::is_same_file(a, b).unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn same_object(_a: &Path, _: &fs::Metadata, _b: &Path, _: &fs::Metadata) -> bool {
    false
}

/// Nearest ancestor of `path` (or `path` itself) that exists.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && fs::symlink_metadata(p).is_ok())
        .map(Path::to_path_buf)
}

#[cfg(unix)]
fn same_volume(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let dev = |p: &Path| {
        existing_ancestor(p)
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.dev())
    };
    match (dev(a), dev(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_volume(a: &Path, b: &Path) -> bool {
    use std::path::Component;

    let volume = |p: &Path| {
        let p = existing_ancestor(p).unwrap_or_else(|| p.to_path_buf());
        let p = std::path::absolute(&p).unwrap_or(p);
        match p.components().next() {
            Some(Component::Prefix(prefix)) => {
                Some(prefix.as_os_str().to_string_lossy().to_lowercase())
            }
            _ => None,
        }
    };
    match (volume(a), volume(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Reports what would happen without touching the file system.
///
/// Existence and volume checks are real, so a dry run makes the same
/// decisions a live run would.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunLinkCreator {
    fs: FsLinkCreator,
}

impl DryRunLinkCreator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkCreator for DryRunLinkCreator {
    fn create_junction(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        debug!(alias = %link.display(), target = %target.display(), "Dry run: junction");
        Ok(())
    }

    fn create_symbolic_link(
        &self,
        link: &Path,
        target: &Path,
        is_directory: bool,
    ) -> Result<(), LinkError> {
        debug!(
            alias = %link.display(),
            target = %target.display(),
            is_directory,
            "Dry run: symbolic link"
        );
        Ok(())
    }

    fn create_hard_link(&self, link: &Path, target: &Path) -> Result<(), LinkError> {
        debug!(alias = %link.display(), target = %target.display(), "Dry run: hard link");
        Ok(())
    }

    fn remove_link(
        &self,
        link: &Path,
        link_type: LinkType,
        _source: &Path,
    ) -> Result<RemoveOutcome, LinkError> {
        debug!(alias = %link.display(), %link_type, "Dry run: remove");
        if self.fs.exists(link) {
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::AlreadyAbsent)
        }
    }

    fn is_alias_of(&self, link: &Path, link_type: LinkType, source: &Path) -> bool {
        self.fs.is_alias_of(link, link_type, source)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), LinkError> {
        debug!(dir = %dir.display(), "Dry run: create directory");
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }

    fn same_volume(&self, a: &Path, b: &Path) -> bool {
        self.fs.same_volume(a, b)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let source_dir = dir.path().join("deep");
        fs::create_dir(&source_dir).unwrap();
        fs::write(source_dir.join("inner.txt"), "payload").unwrap();
        let source_file = dir.path().join("file.txt");
        fs::write(&source_file, "content").unwrap();
        (dir, source_dir, source_file)
    }

    #[test]
    fn test_junction_round_trip() {
        let (dir, source, _) = fixture();
        let creator = FsLinkCreator::new();
        let link = dir.path().join("j");

        creator
            .create(LinkType::Junction, &link, &source, ObjectKind::Directory)
            .unwrap();
        assert_eq!(fs::read_to_string(link.join("inner.txt")).unwrap(), "payload");

        assert_eq!(
            creator.remove_link(&link, LinkType::Junction, &source).unwrap(),
            RemoveOutcome::Removed
        );
        assert!(!creator.exists(&link));
        assert!(source.join("inner.txt").exists());

        assert_eq!(
            creator.remove_link(&link, LinkType::Junction, &source).unwrap(),
            RemoveOutcome::AlreadyAbsent
        );
    }

    #[test]
    fn test_hard_link_round_trip() {
        let (dir, _, source) = fixture();
        let creator = FsLinkCreator::new();
        let link = dir.path().join("h");

        creator.create_hard_link(&link, &source).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "content");

        creator.remove_link(&link, LinkType::HardLink, &source).unwrap();
        assert!(!link.exists());
        assert_eq!(fs::read_to_string(&source).unwrap(), "content");
    }

    #[test]
    fn test_refuses_to_remove_replaced_alias() {
        let (dir, source, file) = fixture();
        let creator = FsLinkCreator::new();

        // A real directory where the link used to be.
        let link = dir.path().join("replaced");
        fs::create_dir(&link).unwrap();
        assert!(matches!(
            creator.remove_link(&link, LinkType::Junction, &source),
            Err(LinkError::NotAnAlias { .. })
        ));
        assert!(link.exists());

        // An independent file with the hard link's name.
        let copy = dir.path().join("copy");
        fs::copy(&file, &copy).unwrap();
        assert!(matches!(
            creator.remove_link(&copy, LinkType::HardLink, &file),
            Err(LinkError::NotAnAlias { .. })
        ));
        assert!(copy.exists());

        // A symlink pointing somewhere else.
        let other = dir.path().join("other");
        std::os::unix::fs::symlink(&file, &other).unwrap();
        assert!(matches!(
            creator.remove_link(&other, LinkType::SymbolicLink, &source),
            Err(LinkError::NotAnAlias { .. })
        ));
    }

    #[test]
    fn test_hard_link_source_missing() {
        let (dir, _, source) = fixture();
        let creator = FsLinkCreator::new();
        let link = dir.path().join("h");
        creator.create_hard_link(&link, &source).unwrap();
        fs::remove_file(&source).unwrap();

        assert!(matches!(
            creator.remove_link(&link, LinkType::HardLink, &source),
            Err(LinkError::SourceMissing { .. })
        ));
        assert!(link.exists());
    }

    #[test]
    fn test_same_volume_uses_existing_ancestor() {
        let (dir, source, _) = fixture();
        let creator = FsLinkCreator::new();
        assert!(creator.same_volume(&source, &dir.path().join("not/yet/created")));
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (dir, source, _) = fixture();
        let creator = DryRunLinkCreator::new();
        let link = dir.path().join("links/j");

        creator.create_dir_all(link.parent().unwrap()).unwrap();
        creator
            .create(LinkType::Junction, &link, &source, ObjectKind::Directory)
            .unwrap();
        assert!(!dir.path().join("links").exists());
        assert!(creator.exists(&source));
    }

    #[test]
    fn test_dangling_link_counts_as_existing() {
        let (dir, _, _) = fixture();
        let link = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("missing"), &link).unwrap();
        assert!(FsLinkCreator::new().exists(&link));
    }

    #[test]
    fn test_is_alias_of() {
        let (dir, source, file) = fixture();
        let creator = FsLinkCreator::new();

        let junction = dir.path().join("j");
        creator.create_junction(&junction, &source).unwrap();
        assert!(creator.is_alias_of(&junction, LinkType::Junction, &source));
        assert!(!creator.is_alias_of(&junction, LinkType::Junction, &file));

        let hard = dir.path().join("h");
        creator.create_hard_link(&hard, &file).unwrap();
        assert!(creator.is_alias_of(&hard, LinkType::HardLink, &file));

        let copy = dir.path().join("copy");
        fs::copy(&file, &copy).unwrap();
        assert!(!creator.is_alias_of(&copy, LinkType::HardLink, &file));
        assert!(!creator.is_alias_of(&dir.path().join("missing"), LinkType::Junction, &source));
    }
}
