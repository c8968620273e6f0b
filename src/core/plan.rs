//! Document-scoped aggregate of the building-block graph
//!
//! One `PlanDocument` per host document: the artifact store, the implant and
//! guide case collections with their dependency graphs, the sharing
//! registry, and the phase controller. The command layer drives everything
//! through this surface; each composite operation suspends undo recording,
//! commits through the store, and issues its invalidation explicitly.

use thiserror::Error;

use crate::blocks::{BlockAttributes, Geometry, ScrewSpec};
use crate::core::case::{CaseCollection, CaseKind};
use crate::core::graph::DependencyGraph;
use crate::core::identity::{BlockId, CaseId};
use crate::core::numbering::{self, NumberingError};
use crate::core::phase::{AppliedLocks, PhaseAccessController, PhaseState};
use crate::core::registry::{BlockKind, BlockRegistry, Cardinality};
use crate::core::sharing::{Divergence, SharingError, SharingRegistry};
use crate::core::store::{ArtifactStore, StoreError};

/// Errors surfaced to the command layer
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Unknown case: {0}")]
    UnknownCase(CaseId),

    #[error("Instance {0} is not a fixation screw")]
    NotAScrew(BlockId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sharing(#[from] SharingError),

    #[error(transparent)]
    Numbering(#[from] NumberingError),
}

/// Result of editing a screw that may be shared
#[derive(Debug)]
pub enum ScrewEditOutcome {
    /// The edit was compatible; these peers were rebuilt under their own GUIDs
    Propagated { updated: Vec<BlockId> },
    /// The edit diverged; the screw was detached from its group
    Diverged(Divergence),
}

/// The building-block graph of one planning document
#[derive(Debug)]
pub struct PlanDocument {
    store: ArtifactStore,
    implant_cases: CaseCollection,
    guide_cases: CaseCollection,
    implant_deps: DependencyGraph,
    guide_deps: DependencyGraph,
    sharing: SharingRegistry,
    phases: PhaseAccessController,
    phase: PhaseState,
}

impl PlanDocument {
    /// Create an empty plan with the standard catalog, graphs, and phase table
    pub fn new() -> Self {
        Self {
            store: ArtifactStore::new(BlockRegistry::standard()),
            implant_cases: CaseCollection::new(CaseKind::Implant),
            guide_cases: CaseCollection::new(CaseKind::Guide),
            implant_deps: DependencyGraph::implant_rules(),
            guide_deps: DependencyGraph::guide_rules(),
            sharing: SharingRegistry::new(),
            phases: PhaseAccessController::standard(),
            phase: PhaseState::Draft,
        }
    }

    /// The artifact store
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Mutable access for operations not covered by the composite surface
    pub fn store_mut(&mut self) -> &mut ArtifactStore {
        &mut self.store
    }

    /// The sharing registry
    pub fn sharing(&self) -> &SharingRegistry {
        &self.sharing
    }

    /// The current document phase
    pub fn phase(&self) -> PhaseState {
        self.phase
    }

    /// The case collection of a kind
    pub fn cases(&self, kind: CaseKind) -> &CaseCollection {
        match kind {
            CaseKind::Implant => &self.implant_cases,
            CaseKind::Guide => &self.guide_cases,
        }
    }

    /// The dependency graph of a case collection
    pub fn dependencies(&self, kind: CaseKind) -> &DependencyGraph {
        match kind {
            CaseKind::Implant => &self.implant_deps,
            CaseKind::Guide => &self.guide_deps,
        }
    }

    /// Which collection a case belongs to
    pub fn case_kind(&self, case: CaseId) -> Option<CaseKind> {
        if self.implant_cases.contains(case) {
            Some(CaseKind::Implant)
        } else if self.guide_cases.contains(case) {
            Some(CaseKind::Guide)
        } else {
            None
        }
    }

    // =========================================================================
    // Case lifecycle
    // =========================================================================

    /// Add a new case under the next free ordinal
    pub fn add_case(&mut self, kind: CaseKind, label: impl Into<String>) -> CaseId {
        self.collection_mut(kind).add(label)
    }

    /// Delete a case and every artifact it owns
    ///
    /// Refused while any owned artifact is still shared with another case;
    /// callers must unshare first. On success the collection is renumbered.
    pub fn delete_case(&mut self, case: CaseId) -> Result<(), PlanError> {
        let kind = self.case_kind(case).ok_or(PlanError::UnknownCase(case))?;
        let removed = self.store.delete_case(case, &self.sharing)?;
        for id in removed {
            self.sharing.forget(id);
        }
        self.collection_mut(kind).remove(case);
        numbering::renumber(self.collection_mut(kind));
        Ok(())
    }

    /// Clone a case and all its artifacts under fresh GUIDs
    ///
    /// The clone keeps its source's ordinal pending resort; the renumber
    /// pass places it directly after the source. Cloned instances are not
    /// members of the source's sharing groups.
    pub fn duplicate_case(
        &mut self,
        case: CaseId,
        label: impl Into<String>,
    ) -> Result<CaseId, PlanError> {
        let kind = self.case_kind(case).ok_or(PlanError::UnknownCase(case))?;

        let mut snapshot = Vec::new();
        for &block_kind in BlockKind::all() {
            for record in self.store.instances_for_case(case, block_kind) {
                let geometry = self.store.geometry(record.id)?.clone();
                snapshot.push((
                    block_kind,
                    record.index,
                    geometry,
                    record.attributes.clone(),
                    record.dirty,
                ));
            }
        }

        let clone = self
            .collection_mut(kind)
            .duplicate(case, label)
            .ok_or(PlanError::UnknownCase(case))?;

        let pause = self.store.document_mut().pause_undo();
        for (block_kind, index, geometry, attributes, dirty) in snapshot {
            let id = match index {
                Some(index) => {
                    self.store
                        .set_indexed(clone, block_kind, index, geometry, attributes)?
                }
                None => self.store.set(clone, block_kind, geometry, attributes)?,
            };
            if dirty {
                self.store.mark_dirty(id);
            }
        }
        self.store.document_mut().resume_undo(pause);

        numbering::renumber(self.collection_mut(kind));
        Ok(clone)
    }

    /// Apply a user-typed ordinal to a case
    pub fn set_case_ordinal(&mut self, case: CaseId, raw_input: &str) -> Result<u32, PlanError> {
        let kind = self.case_kind(case).ok_or(PlanError::UnknownCase(case))?;
        Ok(numbering::set_ordinal(
            self.collection_mut(kind),
            case,
            raw_input,
        )?)
    }

    /// Record a cross-reference from one case to another (e.g. the guides
    /// serving an implant case)
    pub fn link_cases(&mut self, owner: CaseId, other: CaseId) -> Result<(), PlanError> {
        if self.case_kind(other).is_none() {
            return Err(PlanError::UnknownCase(other));
        }
        let kind = self.case_kind(owner).ok_or(PlanError::UnknownCase(owner))?;
        let context = self
            .collection_mut(kind)
            .get_mut(owner)
            .ok_or(PlanError::UnknownCase(owner))?;
        if !context.linked_cases.contains(&other) {
            context.linked_cases.push(other);
        }
        Ok(())
    }

    // =========================================================================
    // Block commits
    // =========================================================================

    /// Commit a singleton block and issue its invalidation in one step
    ///
    /// The set and the notify form one composite edit under a single undo
    /// suspension; the dependent list is the caller's explicit, single-hop
    /// choice.
    pub fn commit_block(
        &mut self,
        case: CaseId,
        kind: BlockKind,
        geometry: Geometry,
        attributes: BlockAttributes,
        dependents: &[BlockKind],
    ) -> Result<BlockId, PlanError> {
        let case_kind = self.case_kind(case).ok_or(PlanError::UnknownCase(case))?;

        let pause = self.store.document_mut().pause_undo();
        let result = self.store.set(case, kind, geometry, attributes);
        self.store.document_mut().resume_undo(pause);
        let id = result?;

        let graph = match case_kind {
            CaseKind::Implant => &self.implant_deps,
            CaseKind::Guide => &self.guide_deps,
        };
        graph.notify_changed(&mut self.store, case, &[kind], dependents);
        Ok(id)
    }

    /// Commit an indexed block and issue its invalidation in one step
    pub fn commit_block_indexed(
        &mut self,
        case: CaseId,
        kind: BlockKind,
        index: u32,
        geometry: Geometry,
        attributes: BlockAttributes,
        dependents: &[BlockKind],
    ) -> Result<BlockId, PlanError> {
        let case_kind = self.case_kind(case).ok_or(PlanError::UnknownCase(case))?;

        let pause = self.store.document_mut().pause_undo();
        let result = self
            .store
            .set_indexed(case, kind, index, geometry, attributes);
        self.store.document_mut().resume_undo(pause);
        let id = result?;

        let graph = match case_kind {
            CaseKind::Implant => &self.implant_deps,
            CaseKind::Guide => &self.guide_deps,
        };
        graph.notify_changed(&mut self.store, case, &[kind], dependents);
        Ok(id)
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    /// Link two cases' screws as one physical screw
    pub fn share_screws(&mut self, a: BlockId, b: BlockId) -> Result<(), PlanError> {
        self.sharing.share(a, b, &self.store)?;
        Ok(())
    }

    /// Remove a screw from its sharing group
    pub fn unshare_screw(&mut self, id: BlockId) -> Result<Vec<BlockId>, PlanError> {
        Ok(self.sharing.unshare(id)?)
    }

    /// Edit a screw that may be shared
    ///
    /// Compatible edits propagate to every group member under the member's
    /// own GUID; a divergent spec detaches the edited screw first and edits
    /// it alone. Either way, the screw's declared dependents are invalidated
    /// in every touched case.
    pub fn edit_screw(
        &mut self,
        id: BlockId,
        geometry: Geometry,
        spec: ScrewSpec,
    ) -> Result<ScrewEditOutcome, PlanError> {
        let record = self
            .store
            .record(id)
            .ok_or(PlanError::Store(StoreError::UnknownInstance(id)))?;
        if record.kind != BlockKind::Screw {
            return Err(PlanError::NotAScrew(id));
        }
        let (case, index) = (record.case, record.index);
        let attributes = BlockAttributes::Screw(spec.clone());

        let pause = self.store.document_mut().pause_undo();
        let outcome = self.edit_screw_inner(id, case, index, geometry, spec, attributes);
        self.store.document_mut().resume_undo(pause);
        let outcome = outcome?;

        let mut touched = vec![case];
        if let ScrewEditOutcome::Propagated { updated } = &outcome {
            for &peer in updated {
                if let Some(peer_record) = self.store.record(peer) {
                    touched.push(peer_record.case);
                }
            }
        }
        for touched_case in touched {
            let Some(kind) = self.case_kind(touched_case) else {
                continue;
            };
            let graph = match kind {
                CaseKind::Implant => &self.implant_deps,
                CaseKind::Guide => &self.guide_deps,
            };
            let dependents: Vec<BlockKind> = graph
                .declared_dependents(&[BlockKind::Screw])
                .into_iter()
                .collect();
            graph.notify_changed(&mut self.store, touched_case, &[BlockKind::Screw], &dependents);
        }

        Ok(outcome)
    }

    fn edit_screw_inner(
        &mut self,
        id: BlockId,
        case: CaseId,
        index: Option<u32>,
        geometry: Geometry,
        spec: ScrewSpec,
        attributes: BlockAttributes,
    ) -> Result<ScrewEditOutcome, PlanError> {
        let diverged = self.sharing.unshare_if_diverged(id, &spec, &self.store)?;

        let committed = match (self.store.registry().cardinality(BlockKind::Screw), index) {
            (Cardinality::IndexedList, Some(index)) => {
                self.store
                    .set_indexed(case, BlockKind::Screw, index, geometry.clone(), attributes.clone())?
            }
            _ => self
                .store
                .set(case, BlockKind::Screw, geometry.clone(), attributes.clone())?,
        };
        debug_assert_eq!(committed, id);

        match diverged {
            Some(divergence) => Ok(ScrewEditOutcome::Diverged(divergence)),
            None => {
                let updated =
                    self.sharing
                        .propagate_edit(id, &geometry, &attributes, &mut self.store)?;
                Ok(ScrewEditOutcome::Propagated { updated })
            }
        }
    }

    /// User-facing message naming the cases affected by a divergence
    pub fn divergence_warning(&self, divergence: &Divergence) -> String {
        let mut labels: Vec<String> = divergence
            .affected_cases
            .iter()
            .filter_map(|&case| {
                self.case_kind(case)
                    .and_then(|kind| self.cases(kind).get(case))
                    .map(|context| context.label.clone())
            })
            .collect();
        labels.sort();
        format!(
            "Screw is no longer shared; sharing with {} was removed",
            labels.join(", ")
        )
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Switch the document phase and re-apply the lock set for a case
    pub fn enter_phase(&mut self, phase: PhaseState, case: CaseId) -> AppliedLocks {
        let applied = self.phases.apply_phase(phase, case, &mut self.store);
        self.phase = phase;
        applied
    }

    fn collection_mut(&mut self, kind: CaseKind) -> &mut CaseCollection {
        match kind {
            CaseKind::Implant => &mut self.implant_cases,
            CaseKind::Guide => &mut self.guide_cases,
        }
    }
}

impl Default for PlanDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ScrewFamily;
    use nalgebra::Point3;

    fn screw_axis(length: f64) -> Geometry {
        Geometry::axis(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, length),
            2.0,
        )
    }

    fn spec(length: f64) -> ScrewSpec {
        ScrewSpec::new(ScrewFamily::Cortical, 2.0, length)
    }

    #[test]
    fn test_commit_block_notifies_dependents() {
        let mut plan = PlanDocument::new();
        let case = plan.add_case(CaseKind::Implant, "Implant 1");

        let plate = plan
            .commit_block(
                case,
                BlockKind::ConnectionPlate,
                Geometry::point(Point3::new(0.0, 0.0, 0.0)),
                BlockAttributes::None,
                &[],
            )
            .unwrap();

        plan.commit_block_indexed(
            case,
            BlockKind::Screw,
            0,
            screw_axis(12.0),
            BlockAttributes::Screw(spec(12.0)),
            &[BlockKind::ConnectionPlate],
        )
        .unwrap();

        assert!(plan.store().is_dirty(plate).unwrap());
    }

    #[test]
    fn test_duplicate_case_clones_artifacts_under_fresh_guids() {
        let mut plan = PlanDocument::new();
        let case = plan.add_case(CaseKind::Guide, "Guide 1");
        let screw = plan
            .commit_block_indexed(
                case,
                BlockKind::Screw,
                0,
                screw_axis(12.0),
                BlockAttributes::Screw(spec(12.0)),
                &[],
            )
            .unwrap();

        let clone = plan.duplicate_case(case, "Guide 1 copy").unwrap();

        let cloned_screw = plan
            .store()
            .get_indexed(clone, BlockKind::Screw, 0)
            .unwrap();
        assert_ne!(cloned_screw.id, screw);
        assert!(!plan.sharing().is_shared(cloned_screw.id));
        // Ordinals resorted: source 1, clone 2
        assert_eq!(plan.cases(CaseKind::Guide).get(clone).unwrap().ordinal, 2);
    }

    #[test]
    fn test_delete_case_renumbers() {
        let mut plan = PlanDocument::new();
        let a = plan.add_case(CaseKind::Guide, "Guide 1");
        let b = plan.add_case(CaseKind::Guide, "Guide 2");
        let c = plan.add_case(CaseKind::Guide, "Guide 3");

        plan.delete_case(b).unwrap();

        assert_eq!(plan.cases(CaseKind::Guide).get(a).unwrap().ordinal, 1);
        assert_eq!(plan.cases(CaseKind::Guide).get(c).unwrap().ordinal, 2);
        assert!(plan.case_kind(b).is_none());
    }

    #[test]
    fn test_link_cases_is_idempotent() {
        let mut plan = PlanDocument::new();
        let implant = plan.add_case(CaseKind::Implant, "Implant 1");
        let guide = plan.add_case(CaseKind::Guide, "Guide 1");

        plan.link_cases(implant, guide).unwrap();
        plan.link_cases(implant, guide).unwrap();

        let context = plan.cases(CaseKind::Implant).get(implant).unwrap();
        assert_eq!(context.linked_cases, vec![guide]);
    }

    #[test]
    fn test_enter_phase_updates_document_phase() {
        let mut plan = PlanDocument::new();
        let case = plan.add_case(CaseKind::Guide, "Guide 1");

        assert_eq!(plan.phase(), PhaseState::Draft);
        plan.enter_phase(PhaseState::Guide, case);
        assert_eq!(plan.phase(), PhaseState::Guide);
    }

    #[test]
    fn test_divergence_warning_names_affected_cases() {
        let mut plan = PlanDocument::new();
        let g1 = plan.add_case(CaseKind::Guide, "Guide 1 (left)");
        let g2 = plan.add_case(CaseKind::Guide, "Guide 2 (right)");
        let s1 = plan
            .commit_block_indexed(
                g1,
                BlockKind::Screw,
                0,
                screw_axis(12.0),
                BlockAttributes::Screw(spec(12.0)),
                &[],
            )
            .unwrap();
        let s2 = plan
            .commit_block_indexed(
                g2,
                BlockKind::Screw,
                0,
                screw_axis(12.0),
                BlockAttributes::Screw(spec(12.0)),
                &[],
            )
            .unwrap();
        plan.share_screws(s1, s2).unwrap();

        let outcome = plan.edit_screw(s1, screw_axis(16.0), spec(16.0)).unwrap();
        let ScrewEditOutcome::Diverged(divergence) = outcome else {
            panic!("length change must diverge");
        };
        assert!(plan
            .divergence_warning(&divergence)
            .contains("Guide 2 (right)"));
    }
}
