//! Deterministic short names.

use std::path::Path;

use compact_str::{CompactString, format_compact};
use shortpath_core::NamingError;

/// Longest hash prefix available from a BLAKE3 hex digest.
pub const MAX_HASH_LENGTH: usize = 64;

/// A generated short name, before conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortName {
    /// `prefix_hash`, safe to use as a file name.
    pub name: CompactString,
    /// The hex digest portion.
    pub hash: CompactString,
}

/// Canonical case-insensitive form of a path.
///
/// Lower-cases, turns `\` into `/`, collapses repeated separators and strips
/// trailing ones, so that spellings of the same location on a
/// case-insensitive file system hash identically.
pub fn normalize(path: &Path) -> String {
    let lowered = path.to_string_lossy().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;

    for c in lowered.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(c);
    }

    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Generate the short name for `path`.
///
/// The name is the first `prefix_length` characters of the basename, an
/// underscore, and the first `hash_length` hex characters of the BLAKE3
/// digest of the normalized path.
///
/// Distinct paths can share a name: with `h` hex characters, a collision
/// between two given paths has probability `16^-h`, and among `n` paths
/// one becomes likely around `n ≈ 4^h`. Shared basename prefixes do not
/// matter since the hash covers the full path. Callers must still resolve
/// conflicts against existing names.
pub fn generate(
    path: &Path,
    prefix_length: usize,
    hash_length: usize,
) -> Result<ShortName, NamingError> {
    if hash_length == 0 || hash_length > MAX_HASH_LENGTH {
        return Err(NamingError::InvalidHashLength {
            length: hash_length,
        });
    }

    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| NamingError::EmptyBasename {
            path: path.to_path_buf(),
        })?;

    let hex = digest_hex(path);
    let hash = CompactString::from(&hex[..hash_length]);

    let prefix: String = basename
        .chars()
        .take(prefix_length)
        .map(sanitize_char)
        .collect();

    Ok(ShortName {
        name: format_compact!("{}_{}", prefix, hash),
        hash,
    })
}

/// Full BLAKE3 hex digest of the normalized path.
pub(crate) fn digest_hex(path: &Path) -> String {
    blake3::hash(normalize(path).as_bytes()).to_hex().to_string()
}

fn sanitize_char(c: char) -> char {
    match c {
        '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
        c if c.is_control() => '_',
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("C:\\Data\\\\Deep\\")), "c:/data/deep");
        assert_eq!(normalize(Path::new("/Home//User/")), "/home/user");
        assert_eq!(normalize(Path::new("/")), "/");
    }

    #[test]
    fn test_deterministic() {
        let a = generate(Path::new("/data/reports/quarterly"), 8, 12).unwrap();
        let b = generate(Path::new("/data/reports/quarterly"), 8, 12).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 12);
        assert_eq!(a.name, format!("quarterl_{}", a.hash));
    }

    #[test]
    fn test_case_and_separator_insensitive() {
        let a = generate(Path::new("/Data/Reports/"), 8, 12).unwrap();
        let b = generate(Path::new("/data//reports"), 8, 12).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_different_paths_differ() {
        let a = generate(Path::new("/a/same"), 8, 12).unwrap();
        let b = generate(Path::new("/b/same"), 8, 12).unwrap();
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_short_basename_and_sanitizing() {
        let name = generate(Path::new("/x/a:b"), 8, 4).unwrap();
        assert!(name.name.starts_with("a_b_"));

        let name = generate(Path::new("/x/tab\there"), 4, 4).unwrap();
        assert!(name.name.starts_with("tab__"));
    }

    #[test]
    fn test_full_length_hash() {
        let name = generate(Path::new("/x/y"), 1, MAX_HASH_LENGTH).unwrap();
        assert_eq!(name.hash.len(), 64);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            generate(Path::new("/x/y"), 8, 0),
            Err(NamingError::InvalidHashLength { length: 0 })
        );
        assert_eq!(
            generate(Path::new("/x/y"), 8, 65),
            Err(NamingError::InvalidHashLength { length: 65 })
        );
        assert!(matches!(
            generate(Path::new("/"), 8, 12),
            Err(NamingError::EmptyBasename { .. })
        ));
    }
}
