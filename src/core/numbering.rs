//! Case ordinal maintenance
//!
//! Display ordinals (`NCase`) must stay unique and contiguous within a
//! collection across insert, delete, and duplicate. Renumbering is stable:
//! ties (a freshly duplicated case shares its source's ordinal) keep their
//! original relative order, so a duplicate lands directly after its source.

use thiserror::Error;
use tracing::debug;

use crate::core::case::CaseCollection;
use crate::core::identity::CaseId;

/// Errors from ordinal edits
#[derive(Debug, Error)]
pub enum NumberingError {
    #[error("Unknown case: {0}")]
    UnknownCase(CaseId),

    #[error("Ordinal input must be digits only, got {input:?}")]
    InvalidInput { input: String },
}

/// Reassign ordinals 1..=N in current order, closing gaps from deletes
///
/// Returns the number of cases whose ordinal changed.
pub fn renumber(collection: &mut CaseCollection) -> usize {
    let mut order: Vec<CaseId> = collection.iter().map(|c| c.id).collect();
    order.sort_by_key(|id| collection.get(*id).map(|c| c.ordinal).unwrap_or(u32::MAX));

    let mut changed = 0;
    for (position, id) in order.iter().enumerate() {
        let target = position as u32 + 1;
        if let Some(case) = collection.get_mut(*id) {
            if case.ordinal != target {
                case.ordinal = target;
                changed += 1;
            }
        }
    }
    if changed > 0 {
        debug!(kind = %collection.kind(), changed, "renumbered case collection");
    }
    changed
}

/// Apply a user-typed ordinal to one case, then restore uniqueness
///
/// Only digit input is accepted; the value is clamped into 1..=N. The case
/// moves to the requested position, everything else shifts, and the
/// collection is renumbered. Postcondition: the live ordinals are exactly
/// {1..N} with no duplicates.
///
/// Returns the ordinal the case actually ended up with.
pub fn set_ordinal(
    collection: &mut CaseCollection,
    case: CaseId,
    raw_input: &str,
) -> Result<u32, NumberingError> {
    if raw_input.is_empty() || !raw_input.chars().all(|c| c.is_ascii_digit()) {
        return Err(NumberingError::InvalidInput {
            input: raw_input.to_string(),
        });
    }
    if !collection.contains(case) {
        return Err(NumberingError::UnknownCase(case));
    }
    let requested: u32 = raw_input
        .parse()
        .map_err(|_| NumberingError::InvalidInput {
            input: raw_input.to_string(),
        })?;

    renumber(collection);
    let total = collection.len() as u32;
    let target = requested.clamp(1, total);

    let mut order: Vec<CaseId> = collection.iter().map(|c| c.id).collect();
    order.sort_by_key(|id| collection.get(*id).map(|c| c.ordinal).unwrap_or(u32::MAX));
    order.retain(|&id| id != case);
    order.insert((target - 1) as usize, case);

    for (position, id) in order.iter().enumerate() {
        if let Some(context) = collection.get_mut(*id) {
            context.ordinal = position as u32 + 1;
        }
    }
    Ok(target)
}
