//! Availability set task

use super::{Describe, resource_group_dependencies, show, show_tags};
use crate::cloud::api::AvailabilitySetModel;
use crate::cloud::{ArmCloud, Tags};
use reconcile::{
    ChangeSet, Cloud, Delta, Field, Lifecycle, Renderer, Resource, RunContext, Target, TaskError,
    TaskKey, TaskSet,
};

const ALIGNED_SKU: &str = "Aligned";
const DEFAULT_FAULT_DOMAINS: u32 = 2;
const DEFAULT_UPDATE_DOMAINS: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilitySet {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub location: Field<String>,
    pub platform_fault_domain_count: Field<u32>,
    pub platform_update_domain_count: Field<u32>,
    pub tags: Field<Tags>,
}

impl AvailabilitySet {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: Field::Set(location.into()),
            ..Self::default()
        }
    }

    pub fn with_domains(mut self, fault: u32, update: u32) -> Self {
        self.platform_fault_domain_count = Field::Set(fault);
        self.platform_update_domain_count = Field::Set(update);
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Field::Set(tags);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    fn from_model(set: AvailabilitySetModel, lifecycle: Lifecycle) -> Self {
        Self {
            name: set.name,
            lifecycle,
            location: Field::Set(set.location),
            platform_fault_domain_count: Field::Set(set.platform_fault_domain_count),
            platform_update_domain_count: Field::Set(set.platform_update_domain_count),
            tags: Field::Set(set.tags),
        }
    }
}

impl Resource for AvailabilitySet {
    const KIND: &'static str = "AvailabilitySet";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn dependencies(&self, tasks: &TaskSet) -> Vec<TaskKey> {
        resource_group_dependencies(tasks)
    }

    fn find(&self, ctx: &RunContext<'_>) -> Result<Option<Self>, TaskError> {
        let cloud = ArmCloud::from_context(ctx)?;
        let set = cloud.availability_sets().get(ctx, &self.name)?;
        Ok(set.map(|s| Self::from_model(s, self.lifecycle)))
    }

    fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
        Self {
            name: desired.name.clone(),
            lifecycle: desired.lifecycle,
            location: delta.field("Location", &actual.location, &desired.location),
            platform_fault_domain_count: delta.field(
                "PlatformFaultDomainCount",
                &actual.platform_fault_domain_count,
                &desired.platform_fault_domain_count,
            ),
            platform_update_domain_count: delta.field(
                "PlatformUpdateDomainCount",
                &actual.platform_update_domain_count,
                &desired.platform_update_domain_count,
            ),
            tags: delta.field("Tags", &actual.tags, &desired.tags),
        }
    }

    // The provider rejects changing domain counts of an existing set
    fn immutable_fields() -> &'static [&'static str] {
        &[
            "Location",
            "PlatformFaultDomainCount",
            "PlatformUpdateDomainCount",
        ]
    }
}

impl Describe for AvailabilitySet {
    fn describe(_desired: &Self, changes: &ChangeSet<Self>) -> Vec<String> {
        let c = changes.changes();
        changes
            .fields()
            .iter()
            .map(|field| match *field {
                "Location" => format!("location: {}", show(&c.location)),
                "PlatformFaultDomainCount" => {
                    format!("fault domains: {}", show(&c.platform_fault_domain_count))
                }
                "PlatformUpdateDomainCount" => {
                    format!("update domains: {}", show(&c.platform_update_domain_count))
                }
                _ => format!("tags: {}", show_tags(&c.tags)),
            })
            .collect()
    }
}

pub struct AvailabilitySetApi;

impl Renderer<AvailabilitySet> for AvailabilitySetApi {
    fn render(
        &self,
        _target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&AvailabilitySet>,
        desired: &AvailabilitySet,
        changes: &ChangeSet<AvailabilitySet>,
    ) -> Result<(), TaskError> {
        let cloud = ArmCloud::from_context(ctx)?;
        if actual.is_none() {
            let model = AvailabilitySetModel {
                name: desired.name.clone(),
                location: desired
                    .location
                    .get()
                    .cloned()
                    .unwrap_or_else(|| cloud.region().to_string()),
                sku: ALIGNED_SKU.to_string(),
                platform_fault_domain_count: desired
                    .platform_fault_domain_count
                    .get()
                    .copied()
                    .unwrap_or(DEFAULT_FAULT_DOMAINS),
                platform_update_domain_count: desired
                    .platform_update_domain_count
                    .get()
                    .copied()
                    .unwrap_or(DEFAULT_UPDATE_DOMAINS),
                tags: desired.tags.clone().managed_value().unwrap_or_default(),
            };
            log::info!(
                "Creating availability set {} ({} fault / {} update domains)",
                model.name,
                model.platform_fault_domain_count,
                model.platform_update_domain_count
            );
            cloud.availability_sets().create(ctx, &model)?;
            return Ok(());
        }

        if let Some(tags) = changes.changes().tags.clone().managed_value() {
            log::info!("Updating tags of availability set {}", desired.name);
            cloud
                .availability_sets()
                .update_tags(ctx, &desired.name, &tags)?;
        }
        Ok(())
    }
}
