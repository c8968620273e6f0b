//! Design-phase access control
//!
//! The document moves through a fixed set of design phases; each phase maps
//! to the set of block kinds a user may edit. Applying a phase locks every
//! object in the document, then unlocks exactly the mapped kinds for the
//! target case. Phase selection itself is driven externally.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::identity::{BlockId, CaseId};
use crate::core::registry::BlockKind;
use crate::core::store::ArtifactStore;

/// Document-wide design phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum PhaseState {
    /// Initial state, nothing case-specific editable
    #[default]
    Draft,
    /// Landmark and screw planning
    Planning,
    /// Planning review, everything locked
    PlanningQc,
    /// Implant authoring
    Implant,
    /// Guide authoring
    Guide,
    /// Teeth block authoring (guide kinds stay editable)
    TeethBlock,
    /// Final metal review, everything locked
    MetalQc,
}

impl PhaseState {
    /// All phases in workflow order
    pub fn all() -> &'static [PhaseState] {
        &[
            PhaseState::Draft,
            PhaseState::Planning,
            PhaseState::PlanningQc,
            PhaseState::Implant,
            PhaseState::Guide,
            PhaseState::TeethBlock,
            PhaseState::MetalQc,
        ]
    }

    /// Stable tag string
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::Draft => "draft",
            PhaseState::Planning => "planning",
            PhaseState::PlanningQc => "planning_qc",
            PhaseState::Implant => "implant",
            PhaseState::Guide => "guide",
            PhaseState::TeethBlock => "teeth_block",
            PhaseState::MetalQc => "metal_qc",
        }
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PhaseState::Draft),
            "planning" => Ok(PhaseState::Planning),
            "planning_qc" => Ok(PhaseState::PlanningQc),
            "implant" => Ok(PhaseState::Implant),
            "guide" => Ok(PhaseState::Guide),
            "teeth_block" => Ok(PhaseState::TeethBlock),
            "metal_qc" => Ok(PhaseState::MetalQc),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// Result of applying a phase to a case
#[derive(Debug, Clone)]
pub struct AppliedLocks {
    /// Phase that was applied
    pub phase: PhaseState,
    /// Total objects locked in the first pass
    pub locked_total: usize,
    /// Instances unlocked for the target case
    pub unlocked: Vec<BlockId>,
}

/// Enum-keyed table of per-phase editable block kinds
#[derive(Debug, Clone)]
pub struct PhaseAccessController {
    unlock_sets: HashMap<PhaseState, BTreeSet<BlockKind>>,
}

impl PhaseAccessController {
    /// Build the standard phase table
    pub fn standard() -> Self {
        let mut unlock_sets: HashMap<PhaseState, BTreeSet<BlockKind>> = HashMap::new();

        // Draft, PlanningQc and MetalQc share the lock-everything preset:
        // no entry, empty unlock set.
        unlock_sets.insert(
            PhaseState::Planning,
            [
                BlockKind::Landmark,
                BlockKind::Screw,
                BlockKind::ImplantMargin,
            ]
            .into_iter()
            .collect(),
        );
        unlock_sets.insert(
            PhaseState::Implant,
            [
                BlockKind::Implant,
                BlockKind::ConnectionPlate,
                BlockKind::ImplantMargin,
            ]
            .into_iter()
            .collect(),
        );
        unlock_sets.insert(
            PhaseState::Guide,
            [
                BlockKind::Guide,
                BlockKind::RegisteredBarrel,
                BlockKind::Screw,
            ]
            .into_iter()
            .collect(),
        );
        unlock_sets.insert(
            PhaseState::TeethBlock,
            [
                BlockKind::Guide,
                BlockKind::RegisteredBarrel,
                BlockKind::TeethBlock,
            ]
            .into_iter()
            .collect(),
        );

        Self { unlock_sets }
    }

    /// Block kinds editable in a phase (empty for the lock-everything preset)
    pub fn unlockable(&self, phase: PhaseState) -> BTreeSet<BlockKind> {
        self.unlock_sets.get(&phase).cloned().unwrap_or_default()
    }

    /// Lock the whole document, then unlock the phase's kinds for one case
    ///
    /// Idempotent: re-applying the same phase with unchanged artifacts
    /// yields the same lock set. A mapped kind with zero instances for the
    /// case is a no-op, not an error.
    pub fn apply_phase(
        &self,
        phase: PhaseState,
        case: CaseId,
        store: &mut ArtifactStore,
    ) -> AppliedLocks {
        store.document_mut().lock_all();
        let locked_total = store.document().len();

        let mut unlocked = Vec::new();
        for kind in self.unlockable(phase) {
            let ids: Vec<BlockId> = store
                .instances_for_case(case, kind)
                .iter()
                .map(|r| r.id)
                .collect();
            if ids.is_empty() {
                debug!(%case, %kind, %phase, "no instances to unlock");
                continue;
            }
            for id in ids {
                store.document_mut().set_locked(id.as_uuid(), false);
                unlocked.push(id);
            }
        }

        AppliedLocks {
            phase,
            locked_total,
            unlocked,
        }
    }
}

impl Default for PhaseAccessController {
    fn default() -> Self {
        Self::standard()
    }
}
