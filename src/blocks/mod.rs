//! Block payload types - geometry values and per-kind attribute metadata

pub mod geometry;
pub mod screw;

pub use geometry::{Geometry, MeshRef};
pub use screw::{BarrelSpec, ScrewFamily, ScrewSpec};

use serde::{Deserialize, Serialize};

/// Derived attribute metadata attached to a block instance
///
/// Only kinds whose downstream operations need typed attributes carry them;
/// everything else stores `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAttributes {
    /// Fixation screw defining attributes
    Screw(ScrewSpec),
    /// Drill barrel attributes
    Barrel(BarrelSpec),
    /// No typed attributes for this kind
    #[default]
    None,
}

impl BlockAttributes {
    /// The screw spec, if this is a screw attribute set
    pub fn as_screw(&self) -> Option<&ScrewSpec> {
        match self {
            BlockAttributes::Screw(spec) => Some(spec),
            _ => None,
        }
    }

    /// The barrel spec, if this is a barrel attribute set
    pub fn as_barrel(&self) -> Option<&BarrelSpec> {
        match self {
            BlockAttributes::Barrel(spec) => Some(spec),
            _ => None,
        }
    }
}
