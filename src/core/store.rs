//! Artifact store - identity-stable CRUD over block instances
//!
//! A typed façade over the host document: block records live in an arena of
//! dense handles with a GUID lookup, geometry stays on the tagged host
//! objects. The load-bearing rule is identity preservation: `set` on an
//! existing (case, kind, index) replaces geometry in place under the same
//! GUID, so sharing groups, lock sets, and linked-case lists indexed by GUID
//! stay valid across edits. A fresh GUID is issued only for a logically new
//! instance.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::blocks::{BlockAttributes, Geometry};
use crate::core::host::{self, Document, ObjectTag, TagError};
use crate::core::identity::{BlockId, CaseId};
use crate::core::registry::{BlockKind, BlockRegistry, Cardinality};
use crate::core::sharing::SharingRegistry;

/// Errors from artifact store operations
///
/// All variants are recovered at the call site; a failed operation leaves
/// the store unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No {kind} instance for case {case}")]
    NotFound { case: CaseId, kind: BlockKind },

    #[error("No {kind} instance with index {index} for case {case}")]
    IndexNotFound {
        case: CaseId,
        kind: BlockKind,
        index: u32,
    },

    #[error("Unknown block instance: {0}")]
    UnknownInstance(BlockId),

    #[error("{kind} is a {expected} kind; use the matching accessor")]
    WrongCardinality {
        kind: BlockKind,
        expected: Cardinality,
    },

    #[error("Identity conflict: case {case} already holds a {kind} instance")]
    IdentityConflict { case: CaseId, kind: BlockKind },

    #[error("Instance {id} is still shared with other cases; unshare it first")]
    StillShared { id: BlockId },

    #[error(transparent)]
    Tag(#[from] TagError),
}

/// One block instance record (geometry lives on the host object)
#[derive(Debug, Clone)]
pub struct BlockRecord {
    /// GUID identity, equal to the host object GUID
    pub id: BlockId,
    /// Owning case
    pub case: CaseId,
    /// Block kind
    pub kind: BlockKind,
    /// Ordinal index for indexed-list kinds
    pub index: Option<u32>,
    /// Derived attribute metadata
    pub attributes: BlockAttributes,
    /// Advisory flag: a declared predecessor changed since the last commit
    pub dirty: bool,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last in-place replacement time
    pub modified: DateTime<Utc>,
}

/// Case-scoped store of typed, identity-stable block instances
#[derive(Debug)]
pub struct ArtifactStore {
    registry: BlockRegistry,
    document: Document,
    slots: Vec<Option<BlockRecord>>,
    by_id: HashMap<BlockId, usize>,
    by_key: HashMap<(CaseId, BlockKind), Vec<usize>>,
    free: Vec<usize>,
}

impl ArtifactStore {
    /// Create an empty store over a fresh document
    pub fn new(registry: BlockRegistry) -> Self {
        Self {
            registry,
            document: Document::new(),
            slots: Vec::new(),
            by_id: HashMap::new(),
            by_key: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Rebuild a store from a loaded document by reading block tags
    ///
    /// Untagged objects (imported anatomy, construction geometry) are left
    /// alone. A tagged object that collides with an already-adopted
    /// singleton, or duplicates an indexed slot, is an identity conflict and
    /// aborts the adoption.
    pub fn adopt(registry: BlockRegistry, document: Document) -> Result<Self, StoreError> {
        let mut adopted: Vec<(BlockId, ObjectTag, BlockAttributes)> = Vec::new();
        for object in document.iter() {
            if !ObjectTag::is_tagged(object) {
                continue;
            }
            let tag = ObjectTag::read_from(object)?;
            let attributes = host::read_attributes(object);
            adopted.push((BlockId::from(object.id), tag, attributes));
        }

        let mut store = Self::new(registry);
        store.document = document;

        for (id, tag, attributes) in adopted {
            let occupied = store
                .handles(tag.case, tag.kind)
                .iter()
                .any(|&h| store.slots[h].as_ref().map(|r| r.index) == Some(tag.index));
            let singleton_clash = store.registry.cardinality(tag.kind) == Cardinality::Singleton
                && store.has(tag.case, tag.kind);
            if occupied || singleton_clash {
                return Err(StoreError::IdentityConflict {
                    case: tag.case,
                    kind: tag.kind,
                });
            }
            store.insert_record(BlockRecord {
                id,
                case: tag.case,
                kind: tag.kind,
                index: tag.index,
                attributes,
                dirty: false,
                created: Utc::now(),
                modified: Utc::now(),
            });
        }

        Ok(store)
    }

    /// The block catalog this store was built with
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// The underlying host document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access to the host document (locking, undo suspension)
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Record for an instance GUID
    pub fn record(&self, id: BlockId) -> Option<&BlockRecord> {
        self.by_id.get(&id).and_then(|&h| self.slots[h].as_ref())
    }

    /// Geometry payload for an instance GUID
    pub fn geometry(&self, id: BlockId) -> Result<&Geometry, StoreError> {
        self.record(id)
            .and_then(|r| self.document.object(r.id.as_uuid()))
            .map(|o| &o.geometry)
            .ok_or(StoreError::UnknownInstance(id))
    }

    /// The unique instance of a singleton kind for a case
    pub fn get(&self, case: CaseId, kind: BlockKind) -> Result<&BlockRecord, StoreError> {
        if self.registry.cardinality(kind) != Cardinality::Singleton {
            return Err(StoreError::WrongCardinality {
                kind,
                expected: Cardinality::IndexedList,
            });
        }
        self.handles(case, kind)
            .first()
            .and_then(|&h| self.slots[h].as_ref())
            .ok_or(StoreError::NotFound { case, kind })
    }

    /// The instance of an indexed-list kind at the given ordinal
    pub fn get_indexed(
        &self,
        case: CaseId,
        kind: BlockKind,
        index: u32,
    ) -> Result<&BlockRecord, StoreError> {
        self.handles(case, kind)
            .iter()
            .filter_map(|&h| self.slots[h].as_ref())
            .find(|r| r.index == Some(index))
            .ok_or(StoreError::IndexNotFound { case, kind, index })
    }

    /// All instances of a kind for one case, ordered by index
    pub fn instances_for_case(&self, case: CaseId, kind: BlockKind) -> Vec<&BlockRecord> {
        let mut records: Vec<&BlockRecord> = self
            .handles(case, kind)
            .iter()
            .filter_map(|&h| self.slots[h].as_ref())
            .collect();
        records.sort_by_key(|r| r.index);
        records
    }

    /// Whether a case holds any instance of a kind
    pub fn has(&self, case: CaseId, kind: BlockKind) -> bool {
        !self.handles(case, kind).is_empty()
    }

    /// GUIDs of every instance of a kind across all cases
    ///
    /// Used for global layer visibility and QC export.
    pub fn all_ids(&self, kind: BlockKind) -> Vec<BlockId> {
        self.slots
            .iter()
            .flatten()
            .filter(|r| r.kind == kind)
            .map(|r| r.id)
            .collect()
    }

    /// Every instance of a kind across all cases
    pub fn all_instances(&self, kind: BlockKind) -> Vec<&BlockRecord> {
        self.slots
            .iter()
            .flatten()
            .filter(|r| r.kind == kind)
            .collect()
    }

    /// Total number of live instances
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the store holds no instances
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Commit a singleton instance: replace in place if present, else create
    ///
    /// The in-place path keeps the existing GUID; every subsystem that
    /// references this instance by GUID stays valid.
    pub fn set(
        &mut self,
        case: CaseId,
        kind: BlockKind,
        geometry: Geometry,
        attributes: BlockAttributes,
    ) -> Result<BlockId, StoreError> {
        if self.registry.cardinality(kind) != Cardinality::Singleton {
            return Err(StoreError::WrongCardinality {
                kind,
                expected: Cardinality::IndexedList,
            });
        }
        let existing = self
            .handles(case, kind)
            .first()
            .and_then(|&h| self.slots[h].as_ref())
            .map(|r| r.id);
        match existing {
            Some(id) => self.replace_in_place(id, geometry, attributes),
            None => Ok(self.create_record(case, kind, None, geometry, attributes)),
        }
    }

    /// Commit an indexed-list instance at an ordinal
    pub fn set_indexed(
        &mut self,
        case: CaseId,
        kind: BlockKind,
        index: u32,
        geometry: Geometry,
        attributes: BlockAttributes,
    ) -> Result<BlockId, StoreError> {
        if self.registry.cardinality(kind) != Cardinality::IndexedList {
            return Err(StoreError::WrongCardinality {
                kind,
                expected: Cardinality::Singleton,
            });
        }
        let existing = self
            .handles(case, kind)
            .iter()
            .filter_map(|&h| self.slots[h].as_ref())
            .find(|r| r.index == Some(index))
            .map(|r| r.id);
        match existing {
            Some(id) => self.replace_in_place(id, geometry, attributes),
            None => Ok(self.create_record(case, kind, Some(index), geometry, attributes)),
        }
    }

    /// Delete an instance, refusing while it is shared with other cases
    ///
    /// Callers must unshare first; the refusal is logged and leaves the
    /// store unchanged.
    pub fn delete(&mut self, id: BlockId, sharing: &SharingRegistry) -> Result<(), StoreError> {
        let handle = *self
            .by_id
            .get(&id)
            .ok_or(StoreError::UnknownInstance(id))?;
        if sharing.is_shared(id) {
            warn!(instance = %id, "refusing to delete a still-shared instance");
            return Err(StoreError::StillShared { id });
        }
        self.remove_handle(handle);
        Ok(())
    }

    /// Delete every instance owned by a case
    ///
    /// All-or-nothing: if any instance is still shared, nothing is removed.
    pub fn delete_case(
        &mut self,
        case: CaseId,
        sharing: &SharingRegistry,
    ) -> Result<Vec<BlockId>, StoreError> {
        let handles: Vec<usize> = self
            .by_key
            .iter()
            .filter(|((c, _), _)| *c == case)
            .flat_map(|(_, hs)| hs.iter().copied())
            .collect();

        for &handle in &handles {
            if let Some(record) = self.slots[handle].as_ref() {
                if sharing.is_shared(record.id) {
                    warn!(
                        case = %case,
                        instance = %record.id,
                        "refusing to delete case with a still-shared instance"
                    );
                    return Err(StoreError::StillShared { id: record.id });
                }
            }
        }

        let mut removed = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(record) = self.remove_handle(handle) {
                removed.push(record.id);
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Dirty flags
    // =========================================================================

    /// Whether a declared predecessor changed since this instance's last commit
    pub fn is_dirty(&self, id: BlockId) -> Result<bool, StoreError> {
        self.record(id)
            .map(|r| r.dirty)
            .ok_or(StoreError::UnknownInstance(id))
    }

    /// Clear the dirty flag after recomputing an instance
    pub fn clear_dirty(&mut self, id: BlockId) -> Result<(), StoreError> {
        let handle = *self
            .by_id
            .get(&id)
            .ok_or(StoreError::UnknownInstance(id))?;
        if let Some(record) = self.slots[handle].as_mut() {
            record.dirty = false;
        }
        Ok(())
    }

    /// Mark every instance of a kind in one case dirty
    ///
    /// Crate-internal: `DependencyGraph::notify_changed` is the only public
    /// mutation path for dirty state.
    pub(crate) fn mark_kind_dirty(&mut self, case: CaseId, kind: BlockKind) -> usize {
        let handles = self.handles(case, kind).to_vec();
        let mut marked = 0;
        for handle in handles {
            if let Some(record) = self.slots[handle].as_mut() {
                record.dirty = true;
                marked += 1;
            }
        }
        marked
    }

    pub(crate) fn mark_dirty(&mut self, id: BlockId) -> bool {
        match self.by_id.get(&id) {
            Some(&handle) => {
                if let Some(record) = self.slots[handle].as_mut() {
                    record.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn handles(&self, case: CaseId, kind: BlockKind) -> &[usize] {
        self.by_key
            .get(&(case, kind))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn replace_in_place(
        &mut self,
        id: BlockId,
        geometry: Geometry,
        attributes: BlockAttributes,
    ) -> Result<BlockId, StoreError> {
        let handle = *self
            .by_id
            .get(&id)
            .ok_or(StoreError::UnknownInstance(id))?;
        self.document.replace_geometry(id.as_uuid(), geometry);
        if let Some(object) = self.document.object_mut(id.as_uuid()) {
            host::write_attributes(object, &attributes);
        }
        if let Some(record) = self.slots[handle].as_mut() {
            record.attributes = attributes;
            record.modified = Utc::now();
        }
        Ok(id)
    }

    fn create_record(
        &mut self,
        case: CaseId,
        kind: BlockKind,
        index: Option<u32>,
        geometry: Geometry,
        attributes: BlockAttributes,
    ) -> BlockId {
        let tag = ObjectTag { kind, case, index };
        let layer = self.registry.layer_path(kind, &case.short());
        let uuid = self.document.insert(tag.object_name(), layer, geometry);
        if let Some(object) = self.document.object_mut(uuid) {
            tag.apply_to(object);
            host::write_attributes(object, &attributes);
        }
        let id = BlockId::from(uuid);
        self.insert_record(BlockRecord {
            id,
            case,
            kind,
            index,
            attributes,
            dirty: false,
            created: Utc::now(),
            modified: Utc::now(),
        });
        id
    }

    fn insert_record(&mut self, record: BlockRecord) {
        let key = (record.case, record.kind);
        let id = record.id;
        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = Some(record);
                handle
            }
            None => {
                self.slots.push(Some(record));
                self.slots.len() - 1
            }
        };
        self.by_id.insert(id, handle);
        self.by_key.entry(key).or_default().push(handle);
    }

    fn remove_handle(&mut self, handle: usize) -> Option<BlockRecord> {
        let record = self.slots[handle].take()?;
        self.by_id.remove(&record.id);
        if let Some(handles) = self.by_key.get_mut(&(record.case, record.kind)) {
            handles.retain(|&h| h != handle);
        }
        self.document.remove(record.id.as_uuid());
        self.free.push(handle);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ScrewFamily, ScrewSpec};
    use nalgebra::Point3;

    fn store() -> ArtifactStore {
        ArtifactStore::new(BlockRegistry::standard())
    }

    fn point(x: f64) -> Geometry {
        Geometry::point(Point3::new(x, 0.0, 0.0))
    }

    fn screw_axis(length: f64) -> Geometry {
        Geometry::axis(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, length),
            2.0,
        )
    }

    fn screw_attrs(length: f64) -> BlockAttributes {
        BlockAttributes::Screw(ScrewSpec::new(ScrewFamily::Cortical, 2.0, length))
    }

    #[test]
    fn test_set_then_get_singleton() {
        let mut store = store();
        let case = CaseId::new();

        let id = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();

        let record = store.get(case, BlockKind::Implant).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.index, None);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = store();
        let case = CaseId::new();
        assert!(matches!(
            store.get(case, BlockKind::Implant),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_set_replaces_in_place_under_same_guid() {
        let mut store = store();
        let case = CaseId::new();

        let first = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();
        let second = store
            .set(case, BlockKind::Implant, point(2.0), BlockAttributes::None)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.instances_for_case(case, BlockKind::Implant).len(), 1);
        match store.geometry(first).unwrap() {
            Geometry::Point { location } => assert_eq!(location.x, 2.0),
            other => panic!("unexpected geometry: {:?}", other),
        }
    }

    #[test]
    fn test_singleton_never_exceeds_one_instance() {
        let mut store = store();
        let case = CaseId::new();

        for i in 0..5 {
            store
                .set(
                    case,
                    BlockKind::Implant,
                    point(i as f64),
                    BlockAttributes::None,
                )
                .unwrap();
        }
        assert_eq!(store.all_instances(BlockKind::Implant).len(), 1);
    }

    #[test]
    fn test_indexed_instances_are_independent() {
        let mut store = store();
        let case = CaseId::new();

        let s0 = store
            .set_indexed(case, BlockKind::Screw, 0, screw_axis(12.0), screw_attrs(12.0))
            .unwrap();
        let s1 = store
            .set_indexed(case, BlockKind::Screw, 1, screw_axis(14.0), screw_attrs(14.0))
            .unwrap();

        assert_ne!(s0, s1);
        assert_eq!(store.get_indexed(case, BlockKind::Screw, 1).unwrap().id, s1);

        // Replacing index 0 keeps its GUID and leaves index 1 alone
        let s0_again = store
            .set_indexed(case, BlockKind::Screw, 0, screw_axis(16.0), screw_attrs(16.0))
            .unwrap();
        assert_eq!(s0, s0_again);
        assert_eq!(store.instances_for_case(case, BlockKind::Screw).len(), 2);
    }

    #[test]
    fn test_cardinality_mismatch_is_rejected() {
        let mut store = store();
        let case = CaseId::new();

        assert!(matches!(
            store.set(case, BlockKind::Screw, screw_axis(12.0), screw_attrs(12.0)),
            Err(StoreError::WrongCardinality { .. })
        ));
        assert!(matches!(
            store.set_indexed(case, BlockKind::Implant, 0, point(1.0), BlockAttributes::None),
            Err(StoreError::WrongCardinality { .. })
        ));
    }

    #[test]
    fn test_delete_removes_record_and_host_object() {
        let mut store = store();
        let sharing = SharingRegistry::new();
        let case = CaseId::new();

        let id = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();
        assert_eq!(store.document().len(), 1);

        store.delete(id, &sharing).unwrap();
        assert!(store.record(id).is_none());
        assert!(store.document().is_empty());
        assert!(!store.has(case, BlockKind::Implant));
    }

    #[test]
    fn test_delete_unknown_instance() {
        let mut store = store();
        let sharing = SharingRegistry::new();
        assert!(matches!(
            store.delete(BlockId::new(), &sharing),
            Err(StoreError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_fresh_guid_after_delete_and_recreate() {
        let mut store = store();
        let sharing = SharingRegistry::new();
        let case = CaseId::new();

        let first = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();
        store.delete(first, &sharing).unwrap();

        let second = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_all_ids_spans_cases() {
        let mut store = store();
        let case_a = CaseId::new();
        let case_b = CaseId::new();

        store
            .set_indexed(case_a, BlockKind::Screw, 0, screw_axis(12.0), screw_attrs(12.0))
            .unwrap();
        store
            .set_indexed(case_b, BlockKind::Screw, 0, screw_axis(12.0), screw_attrs(12.0))
            .unwrap();

        assert_eq!(store.all_ids(BlockKind::Screw).len(), 2);
        assert!(store.all_ids(BlockKind::Guide).is_empty());
    }

    #[test]
    fn test_dirty_flag_lifecycle() {
        let mut store = store();
        let case = CaseId::new();

        let id = store
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();
        assert!(!store.is_dirty(id).unwrap());

        assert_eq!(store.mark_kind_dirty(case, BlockKind::Implant), 1);
        assert!(store.is_dirty(id).unwrap());

        store.clear_dirty(id).unwrap();
        assert!(!store.is_dirty(id).unwrap());
    }

    #[test]
    fn test_adopt_roundtrip() {
        let mut source = store();
        let case = CaseId::new();
        let screw = source
            .set_indexed(case, BlockKind::Screw, 0, screw_axis(12.0), screw_attrs(12.0))
            .unwrap();
        source
            .set(case, BlockKind::Implant, point(1.0), BlockAttributes::None)
            .unwrap();

        // Simulate save/load of the host document
        let json = serde_json::to_string(source.document()).unwrap();
        let document: Document = serde_json::from_str(&json).unwrap();

        let adopted = ArtifactStore::adopt(BlockRegistry::standard(), document).unwrap();
        assert_eq!(adopted.len(), 2);

        let record = adopted.get_indexed(case, BlockKind::Screw, 0).unwrap();
        assert_eq!(record.id, screw);
        assert_eq!(
            record.attributes.as_screw().unwrap().length_mm,
            12.0
        );
    }

    #[test]
    fn test_adopt_rejects_duplicate_singleton() {
        let mut document = Document::new();
        let case = CaseId::new();
        for _ in 0..2 {
            let id = document.insert("x".into(), "cases/x/implant".into(), point(0.0));
            let tag = ObjectTag {
                kind: BlockKind::Implant,
                case,
                index: None,
            };
            tag.apply_to(document.object_mut(id).unwrap());
        }

        assert!(matches!(
            ArtifactStore::adopt(BlockRegistry::standard(), document),
            Err(StoreError::IdentityConflict { .. })
        ));
    }

    #[test]
    fn test_adopt_skips_untagged_objects() {
        let mut document = Document::new();
        document.insert("anatomy_mandible".into(), "anatomy".into(), point(0.0));

        let adopted = ArtifactStore::adopt(BlockRegistry::standard(), document).unwrap();
        assert!(adopted.is_empty());
        assert_eq!(adopted.document().len(), 1);
    }
}
