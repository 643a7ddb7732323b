//! Lifecycle policy
//!
//! Decides, from the lifecycle and the validated change set, whether a task
//! creates, updates, warns or fails. Immutable-field validation has already
//! run when this is consulted.

use crate::error::TaskError;
use crate::types::{Lifecycle, TaskKey, TaskStatus};

/// What to do with a validated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to change
    Unchanged,
    /// Drift was found but the lifecycle forbids fixing it
    Warn(String),
    /// Render the change; the status the task ends with on success
    Apply(TaskStatus),
    /// The lifecycle cannot be satisfied
    Fail(TaskError),
}

/// Apply `lifecycle` to a task whose actual state `exists` and whose change
/// set names `fields`
pub fn decide(key: &TaskKey, lifecycle: Lifecycle, exists: bool, fields: &[&str]) -> Decision {
    if !exists {
        return if lifecycle.allows_create() {
            Decision::Apply(TaskStatus::Created)
        } else {
            Decision::Fail(TaskError::MissingResource {
                key: key.clone(),
                lifecycle,
            })
        };
    }

    if fields.is_empty() {
        return Decision::Unchanged;
    }

    if lifecycle.allows_update() {
        Decision::Apply(TaskStatus::Updated)
    } else {
        Decision::Warn(format!(
            "{key} has drifted ({}) but lifecycle {lifecycle} leaves it unchanged",
            fields.join(", ")
        ))
    }
}

/// Turn a permission failure into a warning for best-effort lifecycles
///
/// Applies to lookups and renders alike. Returns the warning to record, or the original error.
pub fn downgrade(key: &TaskKey, lifecycle: Lifecycle, err: TaskError) -> Result<String, TaskError> {
    if lifecycle.is_best_effort() && matches!(err, TaskError::Permission { .. }) {
        Ok(format!("{key} left unchanged: {err}"))
    } else {
        Err(err)
    }
}
