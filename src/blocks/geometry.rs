//! Opaque geometry payloads carried by building blocks
//!
//! The geometry kernel (meshing, booleans, registration) lives outside this
//! crate. Blocks carry value-level geometry only: an axis for screws and
//! barrels, a mesh handle plus pose for solid bodies, a polyline for margin
//! curves, a single location for landmarks.

use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle to a mesh owned by the geometry kernel.
///
/// The kernel is the source of truth for vertex data; this crate only moves
/// the handle around and preserves it across edits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshRef {
    /// Kernel-side mesh identifier
    pub id: Uuid,
    /// Triangle count at the time the handle was issued
    pub triangle_count: u32,
}

impl MeshRef {
    /// Create a handle for a freshly meshed body
    pub fn new(triangle_count: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            triangle_count,
        }
    }
}

/// Geometry payload of a block instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Geometry {
    /// Entry-to-tip axis with a nominal diameter (screws, drill barrels)
    Axis {
        entry: Point3<f64>,
        tip: Point3<f64>,
        diameter_mm: f64,
    },
    /// Solid body as a kernel mesh handle plus placement
    Mesh { mesh: MeshRef, pose: Isometry3<f64> },
    /// Open or closed polyline (implant margins)
    Curve { points: Vec<Point3<f64>> },
    /// Single anatomical location (landmarks)
    Point { location: Point3<f64> },
}

impl Geometry {
    /// Axis length in millimetres, if this payload is an axis
    pub fn axis_length_mm(&self) -> Option<f64> {
        match self {
            Geometry::Axis { entry, tip, .. } => Some((tip - entry).norm()),
            _ => None,
        }
    }

    /// Convenience constructor for an axis payload
    pub fn axis(entry: Point3<f64>, tip: Point3<f64>, diameter_mm: f64) -> Self {
        Geometry::Axis {
            entry,
            tip,
            diameter_mm,
        }
    }

    /// Convenience constructor for a landmark payload
    pub fn point(location: Point3<f64>) -> Self {
        Geometry::Point { location }
    }
}
