//! Static catalog of building-block kinds
//!
//! Maps each block kind to its storage layer path, cardinality, and required
//! predecessor kinds. Built once at startup as immutable configuration data
//! and passed by reference into the components that need it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind tag of a building block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Fixation screw (shareable across guide cases)
    Screw,
    /// Implant body
    Implant,
    /// Surgical guide body
    Guide,
    /// Anatomical landmark
    Landmark,
    /// Drill barrel registered onto a guide
    RegisteredBarrel,
    /// Plate connecting implant segments
    ConnectionPlate,
    /// Implant margin curve
    ImplantMargin,
    /// Occlusal teeth block
    TeethBlock,
}

impl BlockKind {
    /// All kinds, in registry declaration order
    pub fn all() -> &'static [BlockKind] {
        &[
            BlockKind::Landmark,
            BlockKind::ImplantMargin,
            BlockKind::Screw,
            BlockKind::Implant,
            BlockKind::ConnectionPlate,
            BlockKind::Guide,
            BlockKind::RegisteredBarrel,
            BlockKind::TeethBlock,
        ]
    }

    /// Stable tag string used in layer paths and host object names
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Screw => "screw",
            BlockKind::Implant => "implant",
            BlockKind::Guide => "guide",
            BlockKind::Landmark => "landmark",
            BlockKind::RegisteredBarrel => "registered_barrel",
            BlockKind::ConnectionPlate => "connection_plate",
            BlockKind::ImplantMargin => "implant_margin",
            BlockKind::TeethBlock => "teeth_block",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screw" => Ok(BlockKind::Screw),
            "implant" => Ok(BlockKind::Implant),
            "guide" => Ok(BlockKind::Guide),
            "landmark" => Ok(BlockKind::Landmark),
            "registered_barrel" => Ok(BlockKind::RegisteredBarrel),
            "connection_plate" => Ok(BlockKind::ConnectionPlate),
            "implant_margin" => Ok(BlockKind::ImplantMargin),
            "teeth_block" => Ok(BlockKind::TeethBlock),
            _ => Err(format!("Unknown block kind: {}", s)),
        }
    }
}

/// How many instances of a kind a single case may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one instance per case
    Singleton,
    /// Zero or more instances, addressed by ordinal index
    IndexedList,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::Singleton => write!(f, "singleton"),
            Cardinality::IndexedList => write!(f, "indexed list"),
        }
    }
}

/// Definition of one block kind, created once at startup and never mutated
#[derive(Debug, Clone)]
pub struct BlockDefinition {
    /// The kind this definition describes
    pub kind: BlockKind,
    /// Layer path template; `{case}` expands to the case ordinal
    pub layer_template: &'static str,
    /// Instance cardinality within a case
    pub cardinality: Cardinality,
    /// Kinds that must exist before this one can be authored
    pub predecessors: &'static [BlockKind],
}

/// Immutable catalog of block definitions
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    definitions: HashMap<BlockKind, BlockDefinition>,
}

impl BlockRegistry {
    /// Build the standard catalog
    pub fn standard() -> Self {
        let entries = [
            BlockDefinition {
                kind: BlockKind::Landmark,
                layer_template: "cases/{case}/landmarks",
                cardinality: Cardinality::IndexedList,
                predecessors: &[],
            },
            BlockDefinition {
                kind: BlockKind::ImplantMargin,
                layer_template: "cases/{case}/margin",
                cardinality: Cardinality::Singleton,
                predecessors: &[BlockKind::Landmark],
            },
            BlockDefinition {
                kind: BlockKind::Screw,
                layer_template: "cases/{case}/screws",
                cardinality: Cardinality::IndexedList,
                predecessors: &[BlockKind::Landmark],
            },
            BlockDefinition {
                kind: BlockKind::Implant,
                layer_template: "cases/{case}/implant",
                cardinality: Cardinality::Singleton,
                predecessors: &[BlockKind::ImplantMargin, BlockKind::Screw],
            },
            BlockDefinition {
                kind: BlockKind::ConnectionPlate,
                layer_template: "cases/{case}/connection",
                cardinality: Cardinality::Singleton,
                predecessors: &[BlockKind::Implant, BlockKind::Screw],
            },
            BlockDefinition {
                kind: BlockKind::Guide,
                layer_template: "cases/{case}/guide",
                cardinality: Cardinality::Singleton,
                predecessors: &[BlockKind::Screw, BlockKind::Landmark],
            },
            BlockDefinition {
                kind: BlockKind::RegisteredBarrel,
                layer_template: "cases/{case}/barrels",
                cardinality: Cardinality::IndexedList,
                predecessors: &[BlockKind::Screw, BlockKind::Guide],
            },
            BlockDefinition {
                kind: BlockKind::TeethBlock,
                layer_template: "cases/{case}/teeth_block",
                cardinality: Cardinality::Singleton,
                predecessors: &[BlockKind::Guide],
            },
        ];

        Self {
            definitions: entries.into_iter().map(|d| (d.kind, d)).collect(),
        }
    }

    /// Definition for a kind
    ///
    /// Every kind has an entry in the standard catalog, so this only returns
    /// `None` for registries built from a partial catalog in tests.
    pub fn definition(&self, kind: BlockKind) -> Option<&BlockDefinition> {
        self.definitions.get(&kind)
    }

    /// Cardinality of a kind (standard catalog is total over `BlockKind`)
    pub fn cardinality(&self, kind: BlockKind) -> Cardinality {
        self.definitions
            .get(&kind)
            .map(|d| d.cardinality)
            .unwrap_or(Cardinality::IndexedList)
    }

    /// Predecessor kinds required before authoring `kind`
    pub fn predecessors(&self, kind: BlockKind) -> &[BlockKind] {
        self.definitions
            .get(&kind)
            .map(|d| d.predecessors)
            .unwrap_or(&[])
    }

    /// Expand the layer path template for a case token
    ///
    /// The token is the stable short form of the case GUID, not the display
    /// ordinal - layer paths must survive renumbering.
    pub fn layer_path(&self, kind: BlockKind, case_token: &str) -> String {
        let template = self
            .definitions
            .get(&kind)
            .map(|d| d.layer_template)
            .unwrap_or("cases/{case}/misc");
        template.replace("{case}", case_token)
    }
}
