//! Case contexts - the owning scopes for building blocks
//!
//! A case is one implant or one guide. It groups a related set of artifacts,
//! carries a display ordinal (`NCase`) unique within its collection, and a
//! GUID used for cross-references.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::identity::CaseId;

/// Which collection a case belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Implant,
    Guide,
}

impl CaseKind {
    /// Stable tag string
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseKind::Implant => "implant",
            CaseKind::Guide => "guide",
        }
    }
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One implant or guide case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseContext {
    /// GUID used for cross-references (sharing, linked cases)
    pub id: CaseId,

    /// Collection this case belongs to
    pub kind: CaseKind,

    /// Display ordinal, 1-based, unique within the collection
    pub ordinal: u32,

    /// User-visible label, e.g. "Guide 2 (left fibula)"
    pub label: String,

    /// Cases linked to this one (e.g. guides serving an implant case)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_cases: Vec<CaseId>,
}

/// Insertion-ordered set of cases of one kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseCollection {
    kind: CaseKind,
    cases: IndexMap<CaseId, CaseContext>,
}

impl CaseCollection {
    /// Create an empty collection
    pub fn new(kind: CaseKind) -> Self {
        Self {
            kind,
            cases: IndexMap::new(),
        }
    }

    /// The collection's case kind
    pub fn kind(&self) -> CaseKind {
        self.kind
    }

    /// Add a new case under the next free ordinal
    pub fn add(&mut self, label: impl Into<String>) -> CaseId {
        let ordinal = self
            .cases
            .values()
            .map(|c| c.ordinal)
            .max()
            .unwrap_or(0)
            + 1;
        let case = CaseContext {
            id: CaseId::new(),
            kind: self.kind,
            ordinal,
            label: label.into(),
            linked_cases: Vec::new(),
        };
        let id = case.id;
        self.cases.insert(id, case);
        id
    }

    /// Clone a case under a fresh GUID
    ///
    /// The clone keeps the source ordinal pending the next renumber pass,
    /// so it sorts directly after its source.
    pub fn duplicate(&mut self, source: CaseId, label: impl Into<String>) -> Option<CaseId> {
        let template = self.cases.get(&source)?.clone();
        let case = CaseContext {
            id: CaseId::new(),
            label: label.into(),
            ..template
        };
        let id = case.id;
        self.cases.insert(id, case);
        Some(id)
    }

    /// Look up a case
    pub fn get(&self, id: CaseId) -> Option<&CaseContext> {
        self.cases.get(&id)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, id: CaseId) -> Option<&mut CaseContext> {
        self.cases.get_mut(&id)
    }

    /// Find the case holding a display ordinal
    pub fn by_ordinal(&self, ordinal: u32) -> Option<&CaseContext> {
        self.cases.values().find(|c| c.ordinal == ordinal)
    }

    /// Remove a case, leaving an ordinal gap for the next renumber pass
    pub fn remove(&mut self, id: CaseId) -> Option<CaseContext> {
        self.cases.shift_remove(&id)
    }

    /// Whether a case is in this collection
    pub fn contains(&self, id: CaseId) -> bool {
        self.cases.contains_key(&id)
    }

    /// Iterate cases in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &CaseContext> {
        self.cases.values()
    }

    /// Iterate cases mutably in insertion order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CaseContext> {
        self.cases.values_mut()
    }

    /// Number of cases
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
