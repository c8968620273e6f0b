//! Declarative dependency edges and dirty propagation
//!
//! Each case collection (implant, guide) owns one graph of declared
//! "a change in any of these kinds dirties those kinds" rules. Invalidation
//! rules are data, registered once at construction; `notify_changed` is the
//! only public path that mutates dirty state.
//!
//! Propagation is single-hop from the caller's explicit argument list, never
//! transitive through the declared graph: an operation that needs multi-hop
//! invalidation chains its own calls. Marking dirty does not recompute
//! anything - the system is pull-based, and the operation that declared the
//! dependency recomputes on its next read.

use std::collections::BTreeSet;

use tracing::warn;

use crate::core::identity::CaseId;
use crate::core::registry::BlockKind;
use crate::core::store::ArtifactStore;

/// One declared invalidation rule: multi-source, multi-target
#[derive(Debug, Clone)]
pub struct DependencyRule {
    sources: BTreeSet<BlockKind>,
    dependents: BTreeSet<BlockKind>,
}

/// Per-collection graph of declared invalidation edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    rules: Vec<DependencyRule>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule; called once per edge at graph construction time
    pub fn declare(
        &mut self,
        sources: impl IntoIterator<Item = BlockKind>,
        dependents: impl IntoIterator<Item = BlockKind>,
    ) {
        self.rules.push(DependencyRule {
            sources: sources.into_iter().collect(),
            dependents: dependents.into_iter().collect(),
        });
    }

    /// The standard implant-collection graph
    pub fn implant_rules() -> Self {
        let mut graph = Self::new();
        graph.declare(
            [BlockKind::Screw],
            [BlockKind::ConnectionPlate, BlockKind::Landmark],
        );
        graph.declare([BlockKind::Landmark], [BlockKind::Implant]);
        graph.declare([BlockKind::ImplantMargin], [BlockKind::Implant]);
        graph.declare([BlockKind::Implant], [BlockKind::ConnectionPlate]);
        graph
    }

    /// The standard guide-collection graph
    pub fn guide_rules() -> Self {
        let mut graph = Self::new();
        graph.declare(
            [BlockKind::Screw],
            [
                BlockKind::RegisteredBarrel,
                BlockKind::Landmark,
                BlockKind::ConnectionPlate,
            ],
        );
        graph.declare([BlockKind::Landmark], [BlockKind::Guide]);
        graph.declare(
            [BlockKind::Guide],
            [BlockKind::RegisteredBarrel, BlockKind::TeethBlock],
        );
        graph
    }

    /// Whether an edge from `source` to `dependent` is declared
    pub fn is_declared(&self, source: BlockKind, dependent: BlockKind) -> bool {
        self.rules
            .iter()
            .any(|r| r.sources.contains(&source) && r.dependents.contains(&dependent))
    }

    /// Union of declared dependents reachable in one hop from any source
    pub fn declared_dependents(&self, sources: &[BlockKind]) -> BTreeSet<BlockKind> {
        self.rules
            .iter()
            .filter(|r| sources.iter().any(|s| r.sources.contains(s)))
            .flat_map(|r| r.dependents.iter().copied())
            .collect()
    }

    /// Mark the explicitly listed dependent kinds dirty within one case
    ///
    /// Single-hop: exactly the listed kinds are marked, in `case` only.
    /// A listed dependent with no declared edge from the sources is still
    /// marked, but logged - the call site and the declared data have
    /// drifted apart and one of them is wrong.
    ///
    /// Returns the number of instances marked.
    pub fn notify_changed(
        &self,
        store: &mut ArtifactStore,
        case: CaseId,
        sources: &[BlockKind],
        dependents: &[BlockKind],
    ) -> usize {
        let mut marked = 0;
        for &dependent in dependents {
            if !sources.iter().any(|&s| self.is_declared(s, dependent)) {
                warn!(
                    %case,
                    ?sources,
                    %dependent,
                    "invalidating a dependent with no declared edge"
                );
            }
            marked += store.mark_kind_dirty(case, dependent);
        }
        marked
    }
}
