//! Sharing groups - one physical screw referenced by multiple cases
//!
//! A sharing group is a symmetric, transitive equivalence class of block
//! instances (in practice fixation screws) that represent the same physical
//! object across two or more cases. Membership is union-find over dense
//! handles with a GUID lookup; a group always has at least two members and
//! never two members from the same case.
//!
//! An edit to a shared instance either propagates to every member (same
//! defining attributes, each member keeps its own GUID and index) or, when
//! the defining attributes diverge, detaches the edited member while the
//! rest of the group stays intact.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::warn;

use crate::blocks::{BlockAttributes, Geometry, ScrewSpec};
use crate::core::identity::{BlockId, CaseId};
use crate::core::registry::{BlockKind, Cardinality};
use crate::core::store::{ArtifactStore, StoreError};

/// Errors from sharing operations
#[derive(Debug, Error)]
pub enum SharingError {
    #[error("Cannot share an instance with itself: {0}")]
    SelfShare(BlockId),

    #[error("Unknown block instance: {0}")]
    UnknownInstance(BlockId),

    #[error("Cannot share a {a} with a {b}: kinds differ")]
    KindMismatch { a: BlockKind, b: BlockKind },

    #[error("Sharing would place two instances from case {case} in one group")]
    SameCaseConflict { case: CaseId },

    #[error("Instance {0} is not shared")]
    NotShared(BlockId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of an attribute edit that broke a sharing group apart
#[derive(Debug, Clone)]
pub struct Divergence {
    /// The member that was detached
    pub detached: BlockId,
    /// The members that stayed behind (may have dissolved to a singleton)
    pub former_peers: Vec<BlockId>,
    /// Cases owning the former peers, for the user-facing warning
    pub affected_cases: Vec<CaseId>,
}

#[derive(Debug, Clone)]
struct Node {
    id: BlockId,
    parent: usize,
    rank: u8,
}

/// Equivalence-class registry for shared block instances
#[derive(Debug, Default)]
pub struct SharingRegistry {
    nodes: Vec<Option<Node>>,
    by_id: HashMap<BlockId, usize>,
    free: Vec<usize>,
}

impl SharingRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Whether the instance belongs to a group with at least one other member
    pub fn is_shared(&self, id: BlockId) -> bool {
        match self.by_id.get(&id) {
            Some(&handle) => self.class(handle).len() >= 2,
            None => false,
        }
    }

    /// The other members of the instance's group, if any
    pub fn peers(&self, id: BlockId) -> Vec<BlockId> {
        match self.by_id.get(&id) {
            Some(&handle) => self
                .class(handle)
                .into_iter()
                .filter_map(|h| self.nodes[h].as_ref())
                .map(|n| n.id)
                .filter(|&m| m != id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The full group containing the instance (`None` below two members)
    pub fn group_of(&self, id: BlockId) -> Option<Vec<BlockId>> {
        let handle = *self.by_id.get(&id)?;
        let members: Vec<BlockId> = self
            .class(handle)
            .into_iter()
            .filter_map(|h| self.nodes[h].as_ref())
            .map(|n| n.id)
            .collect();
        if members.len() >= 2 {
            Some(members)
        } else {
            None
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Merge the groups containing `a` and `b`
    ///
    /// Symmetric and transitive by construction. Rejected when the merged
    /// group would contain two instances from one case, when the kinds
    /// differ, or when either instance is unknown to the store; a rejection
    /// leaves the registry unchanged.
    pub fn share(
        &mut self,
        a: BlockId,
        b: BlockId,
        store: &ArtifactStore,
    ) -> Result<(), SharingError> {
        if a == b {
            return Err(SharingError::SelfShare(a));
        }
        let record_a = store.record(a).ok_or(SharingError::UnknownInstance(a))?;
        let record_b = store.record(b).ok_or(SharingError::UnknownInstance(b))?;
        if record_a.kind != record_b.kind {
            return Err(SharingError::KindMismatch {
                a: record_a.kind,
                b: record_b.kind,
            });
        }

        let cases_a = self.group_cases(a, store);
        let cases_b = self.group_cases(b, store);
        if let Some(&case) = cases_a.intersection(&cases_b).next() {
            return Err(SharingError::SameCaseConflict { case });
        }

        let ha = self.intern(a);
        let hb = self.intern(b);
        self.union(ha, hb);
        Ok(())
    }

    /// Remove one member from its group
    ///
    /// The group shrinks by one; a remainder of one member dissolves the
    /// group entirely. Returns the members that were left behind.
    pub fn unshare(&mut self, id: BlockId) -> Result<Vec<BlockId>, SharingError> {
        let handle = *self.by_id.get(&id).ok_or(SharingError::NotShared(id))?;
        let members = self.class(handle);
        if members.len() < 2 {
            return Err(SharingError::NotShared(id));
        }

        // Reset the whole class to singletons, then re-link the remainder.
        let remainder: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&h| h != handle)
            .collect();
        for &h in &members {
            if let Some(node) = self.nodes[h].as_mut() {
                node.parent = h;
                node.rank = 0;
            }
        }
        for pair in remainder.windows(2) {
            self.union(pair[0], pair[1]);
        }

        Ok(remainder
            .into_iter()
            .filter_map(|h| self.nodes[h].as_ref())
            .map(|n| n.id)
            .collect())
    }

    /// Detach an instance whose defining attributes no longer match its group
    ///
    /// Compares the edited spec against every peer; if any peer is
    /// incompatible the instance is detached and the outcome names the
    /// affected cases so the caller can warn the user. `Ok(None)` means the
    /// edit is compatible (or the instance was never shared) and the group
    /// stands.
    pub fn unshare_if_diverged(
        &mut self,
        id: BlockId,
        new_spec: &ScrewSpec,
        store: &ArtifactStore,
    ) -> Result<Option<Divergence>, SharingError> {
        let peers = self.peers(id);
        if peers.is_empty() {
            return Ok(None);
        }

        let mut diverged = false;
        for &peer in &peers {
            let record = store
                .record(peer)
                .ok_or(SharingError::UnknownInstance(peer))?;
            match record.attributes.as_screw() {
                Some(spec) if spec.is_compatible(new_spec) => {}
                _ => {
                    diverged = true;
                    break;
                }
            }
        }
        if !diverged {
            return Ok(None);
        }

        let former_peers = self.unshare(id)?;
        let affected_cases = former_peers
            .iter()
            .filter_map(|&peer| store.record(peer).map(|r| r.case))
            .collect();
        warn!(instance = %id, peers = former_peers.len(), "sharing dissolved by attribute divergence");
        Ok(Some(Divergence {
            detached: id,
            former_peers,
            affected_cases,
        }))
    }

    /// Re-commit an edit to every other member of the source's group
    ///
    /// Each member is rebuilt with the edited geometry and attributes but
    /// its own identity and index, via the store's in-place replacement -
    /// member GUIDs never change. Returns the updated members.
    pub fn propagate_edit(
        &self,
        source: BlockId,
        geometry: &Geometry,
        attributes: &BlockAttributes,
        store: &mut ArtifactStore,
    ) -> Result<Vec<BlockId>, SharingError> {
        let peers = self.peers(source);
        let mut updated = Vec::with_capacity(peers.len());
        for peer in peers {
            let (case, kind, index) = {
                let record = store
                    .record(peer)
                    .ok_or(SharingError::UnknownInstance(peer))?;
                (record.case, record.kind, record.index)
            };
            let committed = match (store.registry().cardinality(kind), index) {
                (Cardinality::IndexedList, Some(index)) => {
                    store.set_indexed(case, kind, index, geometry.clone(), attributes.clone())?
                }
                _ => store.set(case, kind, geometry.clone(), attributes.clone())?,
            };
            debug_assert_eq!(committed, peer);
            updated.push(committed);
        }
        Ok(updated)
    }

    /// Drop an instance from the registry after it is deleted from the store
    pub fn forget(&mut self, id: BlockId) {
        let Some(&handle) = self.by_id.get(&id) else {
            return;
        };
        if self.class(handle).len() >= 2 {
            // Deletion callers unshare first; tolerate stragglers.
            let _ = self.unshare(id);
        }
        self.nodes[handle] = None;
        self.by_id.remove(&id);
        self.free.push(handle);
    }

    // =========================================================================
    // Union-find internals
    // =========================================================================

    fn intern(&mut self, id: BlockId) -> usize {
        if let Some(&handle) = self.by_id.get(&id) {
            return handle;
        }
        let node = Node {
            id,
            parent: 0,
            rank: 0,
        };
        let handle = match self.free.pop() {
            Some(handle) => {
                self.nodes[handle] = Some(node);
                handle
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        if let Some(node) = self.nodes[handle].as_mut() {
            node.parent = handle;
        }
        self.by_id.insert(id, handle);
        handle
    }

    fn root(&self, mut handle: usize) -> usize {
        while let Some(node) = self.nodes[handle].as_ref() {
            if node.parent == handle {
                break;
            }
            handle = node.parent;
        }
        handle
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.root(a);
        let rb = self.root(b);
        if ra == rb {
            return;
        }
        let (rank_a, rank_b) = (
            self.nodes[ra].as_ref().map(|n| n.rank).unwrap_or(0),
            self.nodes[rb].as_ref().map(|n| n.rank).unwrap_or(0),
        );
        let (child, parent) = if rank_a < rank_b { (ra, rb) } else { (rb, ra) };
        if let Some(node) = self.nodes[child].as_mut() {
            node.parent = parent;
        }
        if rank_a == rank_b {
            if let Some(node) = self.nodes[parent].as_mut() {
                node.rank += 1;
            }
        }
    }

    fn class(&self, handle: usize) -> Vec<usize> {
        let root = self.root(handle);
        (0..self.nodes.len())
            .filter(|&h| self.nodes[h].is_some() && self.root(h) == root)
            .collect()
    }

    fn group_cases(&self, id: BlockId, store: &ArtifactStore) -> BTreeSet<CaseId> {
        let mut cases = BTreeSet::new();
        if let Some(record) = store.record(id) {
            cases.insert(record.case);
        }
        for peer in self.peers(id) {
            if let Some(record) = store.record(peer) {
                cases.insert(record.case);
            }
        }
        cases
    }
}
