//! Operation and path mapping records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Opaque unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Generate a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The kind of alias work an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
pub enum OperationKind {
    #[default]
    CreateLink,
}

/// Concrete link type created on disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum LinkType {
    /// Directory alias, same volume only.
    Junction,
    /// File or directory alias, any volume.
    #[strum(to_string = "SymbolicLink", serialize = "symlink")]
    SymbolicLink,
    /// File alias sharing the same data, same volume only.
    #[strum(to_string = "HardLink", serialize = "hardlink")]
    HardLink,
}

/// Requested link type: a concrete type or automatic selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum LinkPreference {
    #[default]
    Auto,
    Junction,
    #[strum(to_string = "SymbolicLink", serialize = "symlink")]
    SymbolicLink,
    #[strum(to_string = "HardLink", serialize = "hardlink")]
    HardLink,
}

impl LinkPreference {
    /// The concrete link type requested, or `None` for automatic selection.
    pub fn explicit(&self) -> Option<LinkType> {
        match self {
            Self::Auto => None,
            Self::Junction => Some(LinkType::Junction),
            Self::SymbolicLink => Some(LinkType::SymbolicLink),
            Self::HardLink => Some(LinkType::HardLink),
        }
    }
}

impl From<LinkType> for LinkPreference {
    fn from(link_type: LinkType) -> Self {
        match link_type {
            LinkType::Junction => Self::Junction,
            LinkType::SymbolicLink => Self::SymbolicLink,
            LinkType::HardLink => Self::HardLink,
        }
    }
}

/// Lifecycle state of an operation.
///
/// `InProgress -> Success -> RolledBack` or `InProgress -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
    RolledBack,
}

impl OperationStatus {
    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (Self::InProgress, Self::Success)
                | (Self::InProgress, Self::Failed)
                | (Self::Success, Self::RolledBack)
        )
    }

    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack)
    }
}

/// Durable record of one attempted alias creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub timestamp: DateTime<Utc>,
    pub kind: OperationKind,
    /// The original, over-long path.
    pub source_path: PathBuf,
    /// The short alias.
    pub target_path: PathBuf,
    pub link_type: LinkType,
    pub status: OperationStatus,
    /// Present iff the status is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Operation {
    /// Create a new in-progress link creation.
    pub fn create_link(
        source_path: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        link_type: LinkType,
    ) -> Self {
        Self {
            id: OperationId::new(),
            timestamp: Utc::now(),
            kind: OperationKind::CreateLink,
            source_path: source_path.into(),
            target_path: target_path.into(),
            link_type,
            status: OperationStatus::InProgress,
            error_message: None,
        }
    }

    /// Check if the alias is currently live.
    pub fn is_active(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

/// Durable record linking an original path to its alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMapping {
    pub operation_id: OperationId,
    pub original_path: PathBuf,
    pub short_path: PathBuf,
    /// Hex digest portion of the short name.
    pub hash_value: String,
    pub created_at: DateTime<Utc>,
}

impl PathMapping {
    /// Create a mapping for a successful operation.
    pub fn new(operation: &Operation, hash_value: impl Into<String>) -> Self {
        Self {
            operation_id: operation.id,
            original_path: operation.source_path.clone(),
            short_path: operation.target_path.clone(),
            hash_value: hash_value.into(),
            created_at: Utc::now(),
        }
    }
}
