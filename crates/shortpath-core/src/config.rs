//! Run configuration.
//!
//! A [`ShortenConfig`] is an immutable snapshot taken at the start of a run.
//! Partial settings (from a config file or the command line) are expressed as
//! a [`ConfigOverlay`] and applied with [`ShortenConfig::merge`], which
//! validates the result instead of silently falling back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::operation::{LinkPreference, LinkType};
use crate::record::path_length;

/// Characters added to the link root by a short name: separator, underscore
/// and room for a conflict suffix.
const NAME_OVERHEAD: usize = 6;

/// Link types used by automatic selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkPreferences {
    /// Directory on the same volume.
    pub directory: LinkType,
    /// File on the same volume.
    pub file: LinkType,
    /// Anything on another volume.
    pub cross_volume: LinkType,
}

impl Default for LinkPreferences {
    fn default() -> Self {
        Self {
            directory: LinkType::Junction,
            file: LinkType::HardLink,
            cross_volume: LinkType::SymbolicLink,
        }
    }
}

impl LinkPreferences {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.directory == LinkType::HardLink {
            return Err(ConfigError::invalid(
                "linkPreferences.directory",
                "hard links cannot alias directories",
            ));
        }
        if self.file == LinkType::Junction {
            return Err(ConfigError::invalid(
                "linkPreferences.file",
                "junctions cannot alias files",
            ));
        }
        if self.cross_volume != LinkType::SymbolicLink {
            return Err(ConfigError::invalid(
                "linkPreferences.crossVolume",
                format!("{} only works within one volume", self.cross_volume),
            ));
        }
        Ok(())
    }
}

/// Configuration for a shortening run.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct ShortenConfig {
    /// Paths longer than this many characters are candidates.
    #[builder(default = "240")]
    pub max_path_length: usize,

    /// Directory in which aliases are created.
    #[builder(default = "default_link_root()")]
    pub short_link_root: PathBuf,

    /// Hex characters of digest in each short name.
    #[builder(default = "12")]
    pub hash_length: usize,

    /// Characters of the original basename kept as a readable prefix.
    #[builder(default = "8")]
    pub prefix_length: usize,

    /// Glob patterns matched against full paths; matches are never candidates.
    #[builder(default)]
    pub exclude_patterns: Vec<String>,

    /// Maximum recursion depth (None = unlimited).
    #[builder(default)]
    pub max_depth: Option<usize>,

    /// Requested link type.
    #[builder(default)]
    pub link_preference: LinkPreference,

    /// Link types chosen by automatic selection.
    #[builder(default)]
    pub link_preferences: LinkPreferences,

    /// Maximum number of new operations in one run.
    #[builder(default = "1000")]
    pub max_operations_per_batch: usize,

    /// Maximum short names tried before giving up on a candidate.
    #[builder(default = "100")]
    pub max_conflict_attempts: usize,

    /// Upper bound for a single link creation call, in seconds (0 = none).
    #[builder(default = "30")]
    pub link_timeout_secs: u64,
}

impl ShortenConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let overlay = ConfigOverlay {
            max_path_length: self.max_path_length,
            short_link_root: self.short_link_root.clone(),
            hash_length: self.hash_length,
            prefix_length: self.prefix_length,
            exclude_patterns: self.exclude_patterns.clone(),
            max_depth: self.max_depth.flatten(),
            link_preference: self.link_preference,
            link_preferences: self.link_preferences,
            max_operations_per_batch: self.max_operations_per_batch,
            max_conflict_attempts: self.max_conflict_attempts,
            link_timeout_secs: self.link_timeout_secs,
        };
        ShortenConfig::default()
            .merge(overlay)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

impl Default for ShortenConfig {
    fn default() -> Self {
        Self {
            max_path_length: 240,
            short_link_root: default_link_root(),
            hash_length: 12,
            prefix_length: 8,
            exclude_patterns: Vec::new(),
            max_depth: None,
            link_preference: LinkPreference::Auto,
            link_preferences: LinkPreferences::default(),
            max_operations_per_batch: 1000,
            max_conflict_attempts: 100,
            link_timeout_secs: 30,
        }
    }
}

impl ShortenConfig {
    /// Create a new config builder.
    pub fn builder() -> ShortenConfigBuilder {
        ShortenConfigBuilder::default()
    }

    /// Apply an overlay on top of this config and validate the result.
    pub fn merge(&self, overlay: ConfigOverlay) -> Result<Self, ConfigError> {
        let mut merged = self.clone();
        if let Some(v) = overlay.max_path_length {
            merged.max_path_length = v;
        }
        if let Some(v) = overlay.short_link_root {
            merged.short_link_root = v;
        }
        if let Some(v) = overlay.hash_length {
            merged.hash_length = v;
        }
        if let Some(v) = overlay.prefix_length {
            merged.prefix_length = v;
        }
        if let Some(v) = overlay.exclude_patterns {
            merged.exclude_patterns = v;
        }
        if let Some(v) = overlay.max_depth {
            merged.max_depth = Some(v);
        }
        if let Some(v) = overlay.link_preference {
            merged.link_preference = v;
        }
        if let Some(v) = overlay.link_preferences {
            merged.link_preferences = v;
        }
        if let Some(v) = overlay.max_operations_per_batch {
            merged.max_operations_per_batch = v;
        }
        if let Some(v) = overlay.max_conflict_attempts {
            merged.max_conflict_attempts = v;
        }
        if let Some(v) = overlay.link_timeout_secs {
            merged.link_timeout_secs = v;
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Check every field and the relationships between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_length == 0 {
            return Err(ConfigError::invalid("maxPathLength", "must be at least 1"));
        }
        if !(1..=64).contains(&self.hash_length) {
            return Err(ConfigError::invalid(
                "hashLength",
                format!("{} is outside 1..=64", self.hash_length),
            ));
        }
        if !(1..=64).contains(&self.prefix_length) {
            return Err(ConfigError::invalid(
                "prefixLength",
                format!("{} is outside 1..=64", self.prefix_length),
            ));
        }
        if self.short_link_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("shortLinkRoot", "cannot be empty"));
        }
        let alias_length = path_length(&self.short_link_root)
            + self.prefix_length
            + self.hash_length
            + NAME_OVERHEAD;
        if alias_length >= self.max_path_length {
            return Err(ConfigError::invalid(
                "shortLinkRoot",
                format!(
                    "aliases would be up to {alias_length} characters, not shorter than maxPathLength {}",
                    self.max_path_length
                ),
            ));
        }
        if self.max_operations_per_batch == 0 {
            return Err(ConfigError::invalid(
                "maxOperationsPerBatch",
                "must be at least 1",
            ));
        }
        if self.max_conflict_attempts == 0 {
            return Err(ConfigError::invalid(
                "maxConflictAttempts",
                "must be at least 1",
            ));
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "excludePatterns",
                "patterns cannot be empty",
            ));
        }
        self.link_preferences.validate()
    }

    /// Bound for a single link creation call.
    pub fn link_timeout(&self) -> Option<Duration> {
        (self.link_timeout_secs > 0).then(|| Duration::from_secs(self.link_timeout_secs))
    }
}

/// Partial configuration; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverlay {
    pub max_path_length: Option<usize>,
    pub short_link_root: Option<PathBuf>,
    pub hash_length: Option<usize>,
    pub prefix_length: Option<usize>,
    pub exclude_patterns: Option<Vec<String>>,
    pub max_depth: Option<usize>,
    pub link_preference: Option<LinkPreference>,
    pub link_preferences: Option<LinkPreferences>,
    pub max_operations_per_batch: Option<usize>,
    pub max_conflict_attempts: Option<usize>,
    pub link_timeout_secs: Option<u64>,
}

impl ConfigOverlay {
    /// Parse an overlay from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load an overlay from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }
}

/// Default directory for aliases.
pub fn default_link_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ShortLinks")
    } else {
        data_dir().join("links")
    }
}

/// Default location of the operation log.
pub fn default_store_path() -> PathBuf {
    data_dir().join("operations.json")
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("shortpath")
}
