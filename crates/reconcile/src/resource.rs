//! Resource trait for task-graph reconciliation
//!
//! A Resource describes one piece of remote infrastructure: how it is
//! identified, what it depends on, how its actual state is found, and which
//! fields can change once it exists.

use crate::changes::{ChangeSet, Delta};
use crate::context::RunContext;
use crate::error::TaskError;
use crate::task::TaskSet;
use crate::types::{Lifecycle, TaskKey};
use crate::validate;
use std::fmt;

/// Core trait for reconciled resources
///
/// The same type carries the desired state (built by a model builder), the
/// actual state (returned by [`Resource::find`]) and the change set (built by
/// [`Resource::diff`]). Attributes are [`Field`](crate::Field)s so "don't
/// manage" stays distinct from "manage as empty".
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// struct Disk {
///     name: String,
///     size_gb: Field<u32>,
/// }
///
/// impl Resource for Disk {
///     const KIND: &'static str = "Disk";
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn find(&self, ctx: &RunContext<'_>) -> Result<Option<Self>, TaskError> {
///         disks(ctx)?.get(&self.name)
///     }
///
///     fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
///         Self {
///             name: desired.name.clone(),
///             size_gb: delta.field("SizeGB", &actual.size_gb, &desired.size_gb),
///         }
///     }
///
///     fn immutable_fields() -> &'static [&'static str] {
///         &["SizeGB"]
///     }
/// }
/// ```
pub trait Resource: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Kind name, the first half of every task key of this type
    const KIND: &'static str;

    /// Name the resource is matched by; stable across runs
    fn name(&self) -> &str;

    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, self.name())
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    /// Tasks that must be applied before this one
    ///
    /// Receives the whole task set so dependencies can be declared by kind.
    fn dependencies(&self, _tasks: &TaskSet) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Look up the actual state
    ///
    /// Return `Ok(None)` or `Err(TaskError::NotFound)` when the resource does
    /// not exist. Every other error fails the task.
    fn find(&self, ctx: &RunContext<'_>) -> Result<Option<Self>, TaskError>;

    /// Build the change set from `actual` to `desired`, one field at a time
    fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self;

    /// Field names that cannot change once the resource exists
    fn immutable_fields() -> &'static [&'static str] {
        &[]
    }

    /// Reject changes the provider cannot apply
    ///
    /// The default implementation rejects every immutable field in the
    /// change set when the resource already exists.
    fn check_changes(
        actual: Option<&Self>,
        _desired: &Self,
        changes: &ChangeSet<Self>,
    ) -> Result<(), TaskError> {
        validate::check_immutable(actual.is_some(), changes, Self::immutable_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Widget;

    #[test]
    fn test_key_uses_kind_and_name() {
        let widget = Widget::new("w1");
        assert_eq!(widget.key(), TaskKey::new("Widget", "w1"));
        assert_eq!(widget.lifecycle(), Lifecycle::Sync);
    }

    #[test]
    fn test_default_check_changes_allows_anything_on_create() {
        let desired = Widget::new("w1").with_size(10);
        let mut delta = Delta::new();
        let changes = Widget::diff(&Widget::default(), &desired, &mut delta);
        let changes = delta.finish(changes);

        assert!(changes.contains("Size"));
        assert!(Widget::check_changes(None, &desired, &changes).is_ok());
        assert!(Widget::check_changes(Some(&Widget::new("w1")), &desired, &changes).is_err());
    }
}
