//! GUID identity for blocks and cases
//!
//! The host document store keys objects by GUID; every cross-reference in
//! this crate (sharing groups, lock sets, linked-case lists) indexes by these
//! newtypes rather than by value. Identity is preserved across in-place
//! geometry replacement - a fresh GUID is only ever issued for a logically
//! new object.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a block instance, equal to its host object GUID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockId(Uuid);

impl BlockId {
    /// Issue a fresh identity for a logically new instance
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying GUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BlockId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a case context (one implant or one guide)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CaseId(Uuid);

impl CaseId {
    /// Issue a fresh case identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying GUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Short form for host object names (first GUID group)
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CaseId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
