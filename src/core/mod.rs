//! Core module - the building-block graph

pub mod case;
pub mod graph;
pub mod host;
pub mod identity;
pub mod numbering;
pub mod phase;
pub mod plan;
pub mod registry;
pub mod sharing;
pub mod store;

pub use case::{CaseCollection, CaseContext, CaseKind};
pub use graph::{DependencyGraph, DependencyRule};
pub use host::{Document, HostObject, ObjectTag, TagError, UndoPause};
pub use identity::{BlockId, CaseId};
pub use numbering::{renumber, set_ordinal, NumberingError};
pub use phase::{AppliedLocks, PhaseAccessController, PhaseState};
pub use plan::{PlanDocument, PlanError, ScrewEditOutcome};
pub use registry::{BlockDefinition, BlockKind, BlockRegistry, Cardinality};
pub use sharing::{Divergence, SharingError, SharingRegistry};
pub use store::{ArtifactStore, BlockRecord, StoreError};
