//! Change validation
//!
//! Runs before any mutation. A change set is computed against the actual
//! snapshot (or an empty resource when absent) and handed to the kind's
//! `check_changes`.

use crate::changes::{ChangeSet, Delta};
use crate::error::TaskError;
use crate::resource::Resource;

/// Reject every immutable field present in `changes` of an existing resource
///
/// All violations are reported in one error.
pub fn check_immutable<R>(
    exists: bool,
    changes: &ChangeSet<R>,
    immutable: &[&str],
) -> Result<(), TaskError> {
    if !exists {
        return Ok(());
    }

    let violations: Vec<String> = changes
        .fields()
        .iter()
        .filter(|field| immutable.contains(field))
        .map(|field| (*field).to_string())
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(TaskError::ImmutableField { fields: violations })
    }
}

/// Compute and validate the change set for one task
pub fn plan_changes<R: Resource>(actual: Option<&R>, desired: &R) -> Result<ChangeSet<R>, TaskError> {
    let empty = R::default();
    let mut delta = Delta::new();
    let changes = R::diff(actual.unwrap_or(&empty), desired, &mut delta);
    let changes = delta.finish(changes);

    R::check_changes(actual, desired, &changes)?;
    Ok(changes)
}
