//! Host document object façade
//!
//! The geometry/document host is the source of truth for geometry payloads,
//! layer paths, locking, and GUID object identity. This module models the
//! slice of it the block graph touches: a GUID-keyed object table with lock
//! flags, per-object user dictionaries, and an undo-recording switch that
//! composite edits suspend and restore.
//!
//! Block instances persist as host objects tagged with a name prefix and
//! user-dictionary entries; [`ObjectTag`] round-trips that convention
//! losslessly across save/load.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::blocks::{BlockAttributes, Geometry};
use crate::core::identity::CaseId;
use crate::core::registry::BlockKind;

/// Name prefix marking an object as a building block
pub const BLOCK_NAME_PREFIX: &str = "bb_";

const KEY_KIND: &str = "bb.kind";
const KEY_CASE: &str = "bb.case";
const KEY_INDEX: &str = "bb.index";
const KEY_ATTRIBUTES: &str = "bb.attributes";

/// One object in the host document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostObject {
    /// Host-assigned GUID identity
    pub id: Uuid,
    /// Display name (carries the block name prefix for tagged objects)
    pub name: String,
    /// Layer path the object lives on
    pub layer: String,
    /// Whether the host currently rejects edits to this object
    pub locked: bool,
    /// User dictionary (string key/value pairs persisted by the host)
    pub user_data: BTreeMap<String, String>,
    /// Geometry payload
    pub geometry: Geometry,
}

/// Errors reading the block tagging convention off a host object
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Object {id} is not a building block (missing {key})")]
    MissingKey { id: Uuid, key: &'static str },

    #[error("Object {id} has malformed tag value for {key}: {value}")]
    MalformedValue {
        id: Uuid,
        key: &'static str,
        value: String,
    },
}

/// Block metadata tagged onto a host object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTag {
    /// Block kind
    pub kind: BlockKind,
    /// Owning case
    pub case: CaseId,
    /// Ordinal index for indexed-list kinds
    pub index: Option<u32>,
}

impl ObjectTag {
    /// Host object name for this tag, e.g. `bb_screw_c3f9a2b1_2`
    pub fn object_name(&self) -> String {
        match self.index {
            Some(index) => format!(
                "{}{}_{}_{}",
                BLOCK_NAME_PREFIX,
                self.kind.as_str(),
                self.case.short(),
                index
            ),
            None => format!(
                "{}{}_{}",
                BLOCK_NAME_PREFIX,
                self.kind.as_str(),
                self.case.short()
            ),
        }
    }

    /// Write the tag into an object's name and user dictionary
    pub fn apply_to(&self, object: &mut HostObject) {
        object.name = self.object_name();
        object
            .user_data
            .insert(KEY_KIND.to_string(), self.kind.as_str().to_string());
        object
            .user_data
            .insert(KEY_CASE.to_string(), self.case.to_string());
        match self.index {
            Some(index) => {
                object
                    .user_data
                    .insert(KEY_INDEX.to_string(), index.to_string());
            }
            None => {
                object.user_data.remove(KEY_INDEX);
            }
        }
    }

    /// Read the tag back from an object's user dictionary
    pub fn read_from(object: &HostObject) -> Result<Self, TagError> {
        let kind_str = object.user_data.get(KEY_KIND).ok_or(TagError::MissingKey {
            id: object.id,
            key: KEY_KIND,
        })?;
        let kind = kind_str
            .parse::<BlockKind>()
            .map_err(|_| TagError::MalformedValue {
                id: object.id,
                key: KEY_KIND,
                value: kind_str.clone(),
            })?;

        let case_str = object.user_data.get(KEY_CASE).ok_or(TagError::MissingKey {
            id: object.id,
            key: KEY_CASE,
        })?;
        let case = case_str
            .parse::<Uuid>()
            .map(CaseId::from)
            .map_err(|_| TagError::MalformedValue {
                id: object.id,
                key: KEY_CASE,
                value: case_str.clone(),
            })?;

        let index = match object.user_data.get(KEY_INDEX) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| TagError::MalformedValue {
                id: object.id,
                key: KEY_INDEX,
                value: raw.clone(),
            })?),
            None => None,
        };

        Ok(Self { kind, case, index })
    }

    /// Whether an object carries the block tagging convention at all
    pub fn is_tagged(object: &HostObject) -> bool {
        object.name.starts_with(BLOCK_NAME_PREFIX) && object.user_data.contains_key(KEY_KIND)
    }
}

/// Write attribute metadata into an object's user dictionary as JSON
pub fn write_attributes(object: &mut HostObject, attributes: &BlockAttributes) {
    match serde_json::to_string(attributes) {
        Ok(json) => {
            object.user_data.insert(KEY_ATTRIBUTES.to_string(), json);
        }
        Err(err) => {
            // Attribute types are plain data; serialization cannot fail for them
            tracing::warn!(object = %object.id, %err, "failed to serialize block attributes");
        }
    }
}

/// Read attribute metadata back from an object's user dictionary
pub fn read_attributes(object: &HostObject) -> BlockAttributes {
    object
        .user_data
        .get(KEY_ATTRIBUTES)
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

/// Token for the preserve-and-restore undo suspension pattern
#[must_use = "pass back to Document::resume_undo to restore the previous state"]
#[derive(Debug)]
pub struct UndoPause {
    previous: bool,
}

/// In-process host document: GUID-keyed object table plus undo switch
///
/// Single-writer by construction; the host serializes all entry points, so
/// there is no internal locking here.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Document {
    objects: IndexMap<Uuid, HostObject>,
    undo_recording: bool,
}

impl Document {
    /// Create an empty document with undo recording on
    pub fn new() -> Self {
        Self {
            objects: IndexMap::new(),
            undo_recording: true,
        }
    }

    /// Insert a new object under a fresh GUID and return it
    pub fn insert(&mut self, name: String, layer: String, geometry: Geometry) -> Uuid {
        let id = Uuid::new_v4();
        self.objects.insert(
            id,
            HostObject {
                id,
                name,
                layer,
                locked: false,
                user_data: BTreeMap::new(),
                geometry,
            },
        );
        id
    }

    /// Look up an object by GUID
    pub fn object(&self, id: Uuid) -> Option<&HostObject> {
        self.objects.get(&id)
    }

    /// Mutable lookup by GUID
    pub fn object_mut(&mut self, id: Uuid) -> Option<&mut HostObject> {
        self.objects.get_mut(&id)
    }

    /// Remove an object, returning it if present
    ///
    /// Preserves the insertion order of the remaining objects so layer
    /// listings stay stable across deletes.
    pub fn remove(&mut self, id: Uuid) -> Option<HostObject> {
        self.objects.shift_remove(&id)
    }

    /// Replace an object's geometry in place, keeping its GUID
    pub fn replace_geometry(&mut self, id: Uuid, geometry: Geometry) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.geometry = geometry;
                true
            }
            None => false,
        }
    }

    /// Lock every object in the document
    pub fn lock_all(&mut self) {
        for object in self.objects.values_mut() {
            object.locked = true;
        }
    }

    /// Set the lock flag on one object
    pub fn set_locked(&mut self, id: Uuid, locked: bool) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.locked = locked;
                true
            }
            None => false,
        }
    }

    /// Iterate all objects in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &HostObject> {
        self.objects.values()
    }

    /// Number of objects in the document
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the document holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether the host is currently recording undo steps
    pub fn is_undo_recording(&self) -> bool {
        self.undo_recording
    }

    /// Suspend undo recording for a composite edit
    ///
    /// Returns a token holding the prior state; pass it to
    /// [`Document::resume_undo`] when the edit is complete so the host can
    /// record one coherent undo step.
    pub fn pause_undo(&mut self) -> UndoPause {
        let previous = self.undo_recording;
        self.undo_recording = false;
        UndoPause { previous }
    }

    /// Restore the undo recording state captured by [`Document::pause_undo`]
    pub fn resume_undo(&mut self, pause: UndoPause) {
        self.undo_recording = pause.previous;
    }
}
