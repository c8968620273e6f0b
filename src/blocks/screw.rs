//! Fixation screw and drill barrel attribute metadata
//!
//! Screw defining attributes (family, diameter, length) decide whether two
//! instances can represent the same physical screw. Sharing across guide
//! cases is dissolved when an edit makes these diverge.

use serde::{Deserialize, Serialize};

/// Manufacturing tolerance under which two dimensions count as equal
const DIMENSION_TOL_MM: f64 = 1e-3;

/// Screw product family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ScrewFamily {
    /// Standard cortical fixation screw
    #[default]
    Cortical,
    /// Locking-head screw for plate fixation
    Locking,
    /// Self-drilling screw placed without a pilot hole
    SelfDrilling,
}

impl std::fmt::Display for ScrewFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrewFamily::Cortical => write!(f, "cortical"),
            ScrewFamily::Locking => write!(f, "locking"),
            ScrewFamily::SelfDrilling => write!(f, "self_drilling"),
        }
    }
}

impl std::str::FromStr for ScrewFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cortical" => Ok(ScrewFamily::Cortical),
            "locking" => Ok(ScrewFamily::Locking),
            "self_drilling" => Ok(ScrewFamily::SelfDrilling),
            _ => Err(format!("Unknown screw family: {}", s)),
        }
    }
}

/// Defining attributes of a fixation screw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrewSpec {
    /// Product family
    pub family: ScrewFamily,

    /// Thread diameter in millimetres
    pub diameter_mm: f64,

    /// Overall length in millimetres
    pub length_mm: f64,
}

impl ScrewSpec {
    /// Create a spec for the given family and dimensions
    pub fn new(family: ScrewFamily, diameter_mm: f64, length_mm: f64) -> Self {
        Self {
            family,
            diameter_mm,
            length_mm,
        }
    }

    /// Whether two specs can describe the same physical screw
    ///
    /// Family must match exactly; dimensions within manufacturing tolerance.
    pub fn is_compatible(&self, other: &ScrewSpec) -> bool {
        self.family == other.family
            && (self.diameter_mm - other.diameter_mm).abs() < DIMENSION_TOL_MM
            && (self.length_mm - other.length_mm).abs() < DIMENSION_TOL_MM
    }
}

impl std::fmt::Display for ScrewSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} \u{2300}{:.1}x{:.1}mm",
            self.family, self.diameter_mm, self.length_mm
        )
    }
}

/// Drill barrel attributes for guided screw placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrelSpec {
    /// Inner sleeve diameter in millimetres
    pub sleeve_diameter_mm: f64,

    /// Barrel height above the guide surface in millimetres
    pub height_mm: f64,
}
