//! Change sets between actual and desired state

use crate::field::Field;

/// The fields of a desired resource that differ from its actual snapshot
///
/// `changes` has the same shape as the resource: only changed fields are
/// managed, everything else is `Unset`. `fields` names them in declaration
/// order.
#[derive(Debug, Clone)]
pub struct ChangeSet<R> {
    changes: R,
    fields: Vec<&'static str>,
}

impl<R> ChangeSet<R> {
    /// Resource carrying only the changed fields
    pub fn changes(&self) -> &R {
        &self.changes
    }

    /// Names of the changed fields
    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// A change set with no fields is a no-op
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_changes(self) -> R {
        self.changes
    }
}

/// Records which fields differ while a resource builds its change set
///
/// ```ignore
/// fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
///     Self {
///         name: desired.name.clone(),
///         size_gb: delta.field("SizeGB", &actual.size_gb, &desired.size_gb),
///         ..Self::default()
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct Delta {
    fields: Vec<&'static str>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one field, recording `name` when it changed
    pub fn field<T>(&mut self, name: &'static str, actual: &Field<T>, desired: &Field<T>) -> Field<T>
    where
        T: PartialEq + Default + Clone,
    {
        let change = Field::delta(actual, desired);
        if change.is_managed() && !self.fields.contains(&name) {
            self.fields.push(name);
        }
        change
    }

    /// Seal the recorded fields together with the changed resource
    pub fn finish<R>(self, changes: R) -> ChangeSet<R> {
        ChangeSet {
            changes,
            fields: self.fields,
        }
    }
}
