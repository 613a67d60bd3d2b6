//! Link type selection.

use shortpath_core::{LinkError, LinkPreference, LinkPreferences, LinkType, ObjectKind};

/// Chooses the link type for a candidate.
///
/// Explicit preferences are checked against what the platform allows for
/// the object; `Auto` consults the configured preference table.
#[derive(Debug, Clone, Default)]
pub struct LinkTypeSelector {
    table: LinkPreferences,
}

impl LinkTypeSelector {
    pub fn new(table: LinkPreferences) -> Self {
        Self { table }
    }

    pub fn select(
        &self,
        kind: ObjectKind,
        same_volume: bool,
        preference: LinkPreference,
    ) -> Result<LinkType, LinkError> {
        let link_type = match preference.explicit() {
            Some(explicit) => explicit,
            None if !same_volume => self.table.cross_volume,
            None if kind.is_dir() => self.table.directory,
            None => self.table.file,
        };

        check_compatible(link_type, kind, same_volume)?;
        Ok(link_type)
    }
}

fn check_compatible(link_type: LinkType, kind: ObjectKind, same_volume: bool) -> Result<(), LinkError> {
    let reason = match link_type {
        LinkType::Junction if !kind.is_dir() => "junctions only alias directories",
        LinkType::Junction if !same_volume => "junctions cannot cross volumes",
        LinkType::HardLink if !kind.is_file() => "hard links only alias files",
        LinkType::HardLink if !same_volume => "hard links cannot cross volumes",
        _ => return Ok(()),
    };

    Err(LinkError::IncompatibleLinkType {
        requested: link_type,
        kind,
        reason,
    })
}
