//! Azure task kinds
//!
//! Each kind is a [`Resource`] with a renderer for the live API target and
//! one for the plan target. Everything scoped to the cluster's resource
//! group depends on every resource-group task.

pub mod availability_set;
pub mod disk;
pub mod resource_group;

pub use availability_set::AvailabilitySet;
pub use disk::Disk;
pub use resource_group::ResourceGroup;

use crate::cloud::{AZURE_API, PLAN, PlanAction, PlanEntry, PlanTarget, Tags};
use reconcile::{
    ChangeSet, Field, RenderRegistry, Renderer, Resource, RunContext, Target, TaskError, TaskKey,
    TaskSet,
};
use std::fmt::Display;

/// Plan rendering for a kind
pub trait Describe: Resource {
    /// `field: value` lines for every field in `changes`
    fn describe(desired: &Self, changes: &ChangeSet<Self>) -> Vec<String>;
}

/// Records intended operations on a [`PlanTarget`]
pub struct PlanRenderer;

impl<R: Describe> Renderer<R> for PlanRenderer {
    fn render(
        &self,
        target: &dyn Target,
        _ctx: &RunContext<'_>,
        actual: Option<&R>,
        desired: &R,
        changes: &ChangeSet<R>,
    ) -> Result<(), TaskError> {
        let plan = PlanTarget::from_target(target)?;
        let action = match actual {
            None => PlanAction::Create,
            Some(_) => PlanAction::Update,
        };
        plan.record(PlanEntry {
            key: desired.key(),
            action,
            details: R::describe(desired, changes),
        });
        Ok(())
    }
}

/// Renderers for every kind on both targets
pub fn renderers() -> RenderRegistry {
    let mut registry = RenderRegistry::new();
    registry
        .register::<ResourceGroup, _>(AZURE_API, resource_group::ResourceGroupApi)
        .register::<ResourceGroup, _>(PLAN, PlanRenderer)
        .register::<Disk, _>(AZURE_API, disk::DiskApi)
        .register::<Disk, _>(PLAN, PlanRenderer)
        .register::<AvailabilitySet, _>(AZURE_API, availability_set::AvailabilitySetApi)
        .register::<AvailabilitySet, _>(PLAN, PlanRenderer);
    registry
}

/// Dependency on every resource group in the task set
pub(crate) fn resource_group_dependencies(tasks: &TaskSet) -> Vec<TaskKey> {
    tasks.keys_of::<ResourceGroup>()
}

pub(crate) fn show<T: Display>(field: &Field<T>) -> String {
    match field {
        Field::Set(v) => v.to_string(),
        Field::Cleared => "(none)".to_string(),
        Field::Unset => "-".to_string(),
    }
}

pub(crate) fn show_tags(field: &Field<Tags>) -> String {
    match field.get() {
        Some(tags) if !tags.is_empty() => tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "(none)".to_string(),
    }
}
