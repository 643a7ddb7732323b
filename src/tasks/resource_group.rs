//! Resource group task

use super::{Describe, show, show_tags};
use crate::cloud::api::ResourceGroupModel;
use crate::cloud::{ArmCloud, Tags};
use reconcile::{
    ChangeSet, Cloud, Delta, Field, Lifecycle, Renderer, Resource, RunContext, Target, TaskError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGroup {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub location: Field<String>,
    pub tags: Field<Tags>,
}

impl ResourceGroup {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: Field::Set(location.into()),
            ..Self::default()
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Field::Set(tags);
        self
    }

    fn from_model(group: ResourceGroupModel, lifecycle: Lifecycle) -> Self {
        Self {
            name: group.name,
            lifecycle,
            location: Field::Set(group.location),
            tags: Field::Set(group.tags),
        }
    }
}

impl Resource for ResourceGroup {
    const KIND: &'static str = "ResourceGroup";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn find(&self, ctx: &RunContext<'_>) -> Result<Option<Self>, TaskError> {
        let cloud = ArmCloud::from_context(ctx)?;
        let group = cloud.resource_groups().get(ctx, &self.name)?;
        Ok(group.map(|g| Self::from_model(g, self.lifecycle)))
    }

    fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
        Self {
            name: desired.name.clone(),
            lifecycle: desired.lifecycle,
            location: delta.field("Location", &actual.location, &desired.location),
            tags: delta.field("Tags", &actual.tags, &desired.tags),
        }
    }

    fn immutable_fields() -> &'static [&'static str] {
        &["Location"]
    }
}

impl Describe for ResourceGroup {
    fn describe(_desired: &Self, changes: &ChangeSet<Self>) -> Vec<String> {
        let c = changes.changes();
        changes
            .fields()
            .iter()
            .map(|field| match *field {
                "Location" => format!("location: {}", show(&c.location)),
                _ => format!("tags: {}", show_tags(&c.tags)),
            })
            .collect()
    }
}

/// Creates groups in the cloud region and patches tags in place
pub struct ResourceGroupApi;

impl Renderer<ResourceGroup> for ResourceGroupApi {
    fn render(
        &self,
        _target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&ResourceGroup>,
        desired: &ResourceGroup,
        changes: &ChangeSet<ResourceGroup>,
    ) -> Result<(), TaskError> {
        let cloud = ArmCloud::from_context(ctx)?;
        if actual.is_none() {
            let model = ResourceGroupModel {
                name: desired.name.clone(),
                location: desired
                    .location
                    .get()
                    .cloned()
                    .unwrap_or_else(|| cloud.region().to_string()),
                tags: desired.tags.clone().managed_value().unwrap_or_default(),
                ..ResourceGroupModel::default()
            };
            log::info!("Creating resource group {} in {}", model.name, model.location);
            cloud.resource_groups().create(ctx, &model)?;
            return Ok(());
        }

        if let Some(tags) = changes.changes().tags.clone().managed_value() {
            log::info!("Updating tags of resource group {}", desired.name);
            cloud.resource_groups().update_tags(ctx, &desired.name, &tags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::validate::plan_changes;
    use std::collections::BTreeMap;

    fn existing() -> ResourceGroup {
        ResourceGroup::new("rg1", "westeurope").with_tags(BTreeMap::new())
    }

    #[test]
    fn test_unmanaged_tags_never_drift() {
        let desired = ResourceGroup::new("rg1", "westeurope");
        let changes = plan_changes(Some(&existing()), &desired).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_location_cannot_move() {
        let desired = ResourceGroup::new("rg1", "northeurope");
        let err = plan_changes(Some(&existing()), &desired).unwrap_err();
        assert_eq!(err, TaskError::immutable("Location"));
    }

    #[test]
    fn test_describe_create() {
        let tags = BTreeMap::from([("clusterup.io/cluster".to_string(), "c1".to_string())]);
        let desired = ResourceGroup::new("rg1", "westeurope").with_tags(tags);
        let changes = plan_changes(None, &desired).unwrap();
        assert_eq!(
            ResourceGroup::describe(&desired, &changes),
            vec![
                "location: westeurope".to_string(),
                "tags: clusterup.io/cluster=c1".to_string()
            ]
        );
    }
}
