//! Shared helpers for integration tests

use nalgebra::Point3;

use osteoplan::blocks::{BlockAttributes, Geometry, ScrewFamily, ScrewSpec};
use osteoplan::core::{BlockId, BlockKind, CaseId, CaseKind, PlanDocument};

/// A straight screw axis along Z with the given length
pub fn screw_axis(length_mm: f64) -> Geometry {
    Geometry::axis(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, 0.0, length_mm),
        2.0,
    )
}

/// A standard cortical screw spec with the given length
pub fn screw_spec(length_mm: f64) -> ScrewSpec {
    ScrewSpec::new(ScrewFamily::Cortical, 2.0, length_mm)
}

/// Commit a screw at the given index into a case
pub fn add_screw(plan: &mut PlanDocument, case: CaseId, index: u32, length_mm: f64) -> BlockId {
    plan.commit_block_indexed(
        case,
        BlockKind::Screw,
        index,
        screw_axis(length_mm),
        BlockAttributes::Screw(screw_spec(length_mm)),
        &[],
    )
    .expect("screw commit failed")
}

/// Install a test subscriber so `RUST_LOG` surfaces core warnings
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A plan with one implant case and two guide cases
pub fn planned_document() -> (PlanDocument, CaseId, CaseId, CaseId) {
    init_tracing();
    let mut plan = PlanDocument::new();
    let implant = plan.add_case(CaseKind::Implant, "Implant 1");
    let guide_a = plan.add_case(CaseKind::Guide, "Guide 1");
    let guide_b = plan.add_case(CaseKind::Guide, "Guide 2");
    (plan, implant, guide_a, guide_b)
}
