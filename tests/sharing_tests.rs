//! Sharing tests - equivalence groups, divergence, and the shared-screw flow

mod common;

use common::{add_screw, planned_document, screw_axis, screw_spec};
use pretty_assertions::assert_eq;

use osteoplan::core::{CaseKind, PlanDocument, ScrewEditOutcome, StoreError};

// ============================================================================
// Group algebra
// ============================================================================

#[test]
fn test_sharing_is_symmetric_and_transitive() {
    let mut plan = PlanDocument::new();
    let g1 = plan.add_case(CaseKind::Guide, "Guide 1");
    let g2 = plan.add_case(CaseKind::Guide, "Guide 2");
    let g3 = plan.add_case(CaseKind::Guide, "Guide 3");
    let s1 = add_screw(&mut plan, g1, 0, 12.0);
    let s2 = add_screw(&mut plan, g2, 0, 12.0);
    let s3 = add_screw(&mut plan, g3, 0, 12.0);

    plan.share_screws(s1, s2).unwrap();
    plan.share_screws(s2, s3).unwrap();

    for id in [s1, s2, s3] {
        let group = plan.sharing().group_of(id).unwrap();
        assert_eq!(group.len(), 3);
    }
    // Symmetry: peers of s1 include s2 and vice versa
    assert!(plan.sharing().peers(s1).contains(&s2));
    assert!(plan.sharing().peers(s2).contains(&s1));
}

#[test]
fn test_unshare_shrinks_then_dissolves() {
    let mut plan = PlanDocument::new();
    let g1 = plan.add_case(CaseKind::Guide, "Guide 1");
    let g2 = plan.add_case(CaseKind::Guide, "Guide 2");
    let g3 = plan.add_case(CaseKind::Guide, "Guide 3");
    let s1 = add_screw(&mut plan, g1, 0, 12.0);
    let s2 = add_screw(&mut plan, g2, 0, 12.0);
    let s3 = add_screw(&mut plan, g3, 0, 12.0);
    plan.share_screws(s1, s2).unwrap();
    plan.share_screws(s2, s3).unwrap();

    // N=3 -> N=2: remaining pair stays consistent
    plan.unshare_screw(s1).unwrap();
    assert!(!plan.sharing().is_shared(s1));
    assert_eq!(plan.sharing().group_of(s2).unwrap().len(), 2);

    // N=2 -> dissolved entirely
    plan.unshare_screw(s2).unwrap();
    assert!(!plan.sharing().is_shared(s2));
    assert!(!plan.sharing().is_shared(s3));
}

// ============================================================================
// Edit propagation and divergence
// ============================================================================

#[test]
fn test_compatible_edit_propagates_under_peer_guids() {
    let (mut plan, _, guide_a, guide_b) = planned_document();
    let s1 = add_screw(&mut plan, guide_a, 0, 12.0);
    let s2 = add_screw(&mut plan, guide_b, 0, 12.0);
    plan.share_screws(s1, s2).unwrap();

    // Same spec, new placement: propagates
    let outcome = plan.edit_screw(s1, screw_axis(12.0), screw_spec(12.0)).unwrap();
    let ScrewEditOutcome::Propagated { updated } = outcome else {
        panic!("compatible edit must propagate");
    };

    assert_eq!(updated, vec![s2]);
    assert!(plan.sharing().is_shared(s1));
    // The peer's record still answers to its original GUID
    assert_eq!(plan.store().record(s2).unwrap().id, s2);
}

#[test]
fn test_divergent_edit_detaches_only_the_edited_screw() {
    let mut plan = PlanDocument::new();
    let g1 = plan.add_case(CaseKind::Guide, "Guide 1");
    let g2 = plan.add_case(CaseKind::Guide, "Guide 2");
    let g3 = plan.add_case(CaseKind::Guide, "Guide 3");
    let s1 = add_screw(&mut plan, g1, 0, 12.0);
    let s2 = add_screw(&mut plan, g2, 0, 12.0);
    let s3 = add_screw(&mut plan, g3, 0, 12.0);
    plan.share_screws(s1, s2).unwrap();
    plan.share_screws(s2, s3).unwrap();

    let outcome = plan.edit_screw(s1, screw_axis(16.0), screw_spec(16.0)).unwrap();
    let ScrewEditOutcome::Diverged(divergence) = outcome else {
        panic!("length change must diverge");
    };

    assert_eq!(divergence.detached, s1);
    assert_eq!(divergence.former_peers.len(), 2);
    assert!(!plan.sharing().is_shared(s1));
    // The rest of the group is intact and still consistent
    assert_eq!(plan.sharing().group_of(s2).unwrap().len(), 2);

    // The divergent edit applied to the edited screw only
    assert_eq!(
        plan.store().geometry(s1).unwrap().axis_length_mm(),
        Some(16.0)
    );
    assert_eq!(
        plan.store().geometry(s2).unwrap().axis_length_mm(),
        Some(12.0)
    );
}

// ============================================================================
// End-to-end shared screw scenario
// ============================================================================

#[test]
fn test_shared_screw_lifecycle() {
    let (mut plan, implant, guide_a, _) = planned_document();

    // Implant case #1 holds screw S1; guide case #1 holds screw S2
    let s1 = add_screw(&mut plan, implant, 0, 12.0);
    let s2 = add_screw(&mut plan, guide_a, 0, 12.0);

    // Link them as one physical screw
    plan.share_screws(s1, s2).unwrap();

    // Edit S1's placement: S2 follows, keeping its own GUID
    let outcome = plan.edit_screw(s1, screw_axis(12.0), screw_spec(12.0)).unwrap();
    assert!(matches!(outcome, ScrewEditOutcome::Propagated { .. }));
    assert_eq!(plan.store().record(s2).unwrap().id, s2);

    // Deleting the implant case must fail while S1 is still shared
    let err = plan.delete_case(implant).unwrap_err();
    assert!(matches!(
        err,
        osteoplan::core::PlanError::Store(StoreError::StillShared { .. })
    ));
    // The refusal left everything in place
    assert!(plan.store().record(s1).is_some());
    assert!(plan.case_kind(implant).is_some());

    // Unshare first, then the delete goes through
    plan.unshare_screw(s1).unwrap();
    plan.delete_case(implant).unwrap();
    assert!(plan.store().record(s1).is_none());
    assert!(plan.store().record(s2).is_some());
    assert!(!plan.sharing().is_shared(s2));
}
