//! Managed disk task
//!
//! Size, zone, storage type and location are fixed at creation. Only tags
//! are patched on an existing disk.

use super::{Describe, resource_group_dependencies, show, show_tags};
use crate::cloud::api::DiskModel;
use crate::cloud::{ArmCloud, StorageSku, Tags};
use reconcile::{
    ChangeSet, Cloud, Delta, Field, Lifecycle, Renderer, Resource, RunContext, Target, TaskError,
    TaskKey, TaskSet, validate,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub location: Field<String>,
    pub volume_type: Field<StorageSku>,
    pub size_gb: Field<u32>,
    pub zone: Field<String>,
    pub tags: Field<Tags>,
}

impl Disk {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: Field::Set(location.into()),
            ..Self::default()
        }
    }

    pub fn with_size_gb(mut self, size_gb: u32) -> Self {
        self.size_gb = Field::Set(size_gb);
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Field::Set(zone.into());
        self
    }

    pub fn with_volume_type(mut self, volume_type: StorageSku) -> Self {
        self.volume_type = Field::Set(volume_type);
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

    fn from_model(disk: DiskModel, lifecycle: Lifecycle) -> Self {
        Self {
            name: disk.name,
            lifecycle,
            location: Field::Set(disk.location),
            volume_type: Field::Set(disk.sku),
            size_gb: Field::Set(disk.disk_size_gb),
            zone: Field::observed(disk.zones.into_iter().next()),
            tags: Field::Set(disk.tags),
        }
    }
}

impl Resource for Disk {
    const KIND: &'static str = "Disk";

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
        let disk = cloud.disks().get(ctx, &self.name)?;
        Ok(disk.map(|d| Self::from_model(d, self.lifecycle)))
    }

    fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
        Self {
            name: desired.name.clone(),
            lifecycle: desired.lifecycle,
            location: delta.field("Location", &actual.location, &desired.location),
            volume_type: delta.field("VolumeType", &actual.volume_type, &desired.volume_type),
            size_gb: delta.field("SizeGB", &actual.size_gb, &desired.size_gb),
            zone: delta.field("Zone", &actual.zone, &desired.zone),
            tags: delta.field("Tags", &actual.tags, &desired.tags),
        }
    }

    fn immutable_fields() -> &'static [&'static str] {
        &["Location", "VolumeType", "SizeGB", "Zone"]
    }

    fn check_changes(
        actual: Option<&Self>,
        desired: &Self,
        changes: &ChangeSet<Self>,
    ) -> Result<(), TaskError> {
        if actual.is_none() && desired.size_gb.get().is_none_or(|size| *size == 0) {
            return Err(TaskError::invalid(format!(
                "disk {} needs a size to be created",
                desired.name
            )));
        }
        validate::check_immutable(actual.is_some(), changes, Self::immutable_fields())
    }
}

impl Describe for Disk {
    fn describe(_desired: &Self, changes: &ChangeSet<Self>) -> Vec<String> {
        let c = changes.changes();
        changes
            .fields()
            .iter()
            .map(|field| match *field {
                "Location" => format!("location: {}", show(&c.location)),
                "VolumeType" => format!("type: {}", show(&c.volume_type)),
                "SizeGB" => format!("size: {} GB", show(&c.size_gb)),
                "Zone" => format!("zone: {}", show(&c.zone)),
                _ => format!("tags: {}", show_tags(&c.tags)),
            })
            .collect()
    }
}

/// Creates disks as a long-running operation and patches tags in place
pub struct DiskApi;

impl Renderer<Disk> for DiskApi {
    fn render(
        &self,
        _target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&Disk>,
        desired: &Disk,
        changes: &ChangeSet<Disk>,
    ) -> Result<(), TaskError> {
        let cloud = ArmCloud::from_context(ctx)?;
        if actual.is_none() {
            let model = DiskModel {
                name: desired.name.clone(),
                location: desired
                    .location
                    .get()
                    .cloned()
                    .unwrap_or_else(|| cloud.region().to_string()),
                sku: desired.volume_type.get().copied().unwrap_or_default(),
                disk_size_gb: desired.size_gb.get().copied().unwrap_or_default(),
                zones: desired.zone.get().cloned().into_iter().collect(),
                tags: desired.tags.clone().managed_value().unwrap_or_default(),
                ..DiskModel::default()
            };
            log::info!(
                "Creating disk {} ({} GB, {})",
                model.name,
                model.disk_size_gb,
                model.sku
            );
            cloud.disks().create(ctx, &model)?;
            return Ok(());
        }

        if let Some(tags) = changes.changes().tags.clone().managed_value() {
            log::info!("Updating tags of disk {}", desired.name);
            cloud.disks().update_tags(ctx, &desired.name, &tags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::validate::plan_changes;

    fn existing() -> Disk {
        Disk::new("etcd-c1", "westeurope")
            .with_size_gb(100)
            .with_volume_type(StorageSku::PremiumLrs)
            .with_tags(Tags::new())
    }

    #[test]
    fn test_missing_zone_matches_unset_zone() {
        let mut actual = existing();
        actual.zone = Field::Cleared;
        let desired = Disk::new("etcd-c1", "westeurope").with_size_gb(100);
        assert!(plan_changes(Some(&actual), &desired).unwrap().is_empty());
    }

    #[test]
    fn test_size_change_is_immutable() {
        let desired = Disk::new("etcd-c1", "westeurope").with_size_gb(200);
        let err = plan_changes(Some(&existing()), &desired).unwrap_err();
        assert_eq!(err, TaskError::immutable("SizeGB"));
    }

    #[test]
    fn test_location_change_is_immutable() {
        let desired = Disk::new("etcd-c1", "northeurope").with_size_gb(100);
        let err = plan_changes(Some(&existing()), &desired).unwrap_err();
        assert_eq!(err, TaskError::immutable("Location"));
    }

    #[test]
    fn test_create_requires_size() {
        let desired = Disk::new("etcd-c1", "westeurope");
        let err = plan_changes(None, &desired).unwrap_err();
        assert!(matches!(err, TaskError::InvalidDesired { .. }));
    }

    #[test]
    fn test_tags_are_mutable() {
        let tags = Tags::from([("role".to_string(), "etcd".to_string())]);
        let desired = Disk::new("etcd-c1", "westeurope")
            .with_size_gb(100)
            .with_tags(tags.clone());
        let changes = plan_changes(Some(&existing()), &desired).unwrap();

        assert_eq!(changes.fields(), &["Tags"]);
        assert_eq!(changes.changes().tags, Field::Set(tags));
        assert!(changes.changes().size_gb.is_unset());
    }

    #[test]
    fn test_depends_on_every_resource_group() {
        use crate::tasks::ResourceGroup;

        let mut tasks = TaskSet::new();
        tasks.insert(ResourceGroup::new("rg1", "westeurope")).unwrap();
        tasks.insert(ResourceGroup::new("rg2", "westeurope")).unwrap();
        let deps = existing().dependencies(&tasks);

        assert_eq!(
            deps,
            vec![
                TaskKey::new("ResourceGroup", "rg1"),
                TaskKey::new("ResourceGroup", "rg2")
            ]
        );
    }

    #[test]
    fn test_from_model_maps_every_field() {
        let model = DiskModel {
            name: "etcd-c1".to_string(),
            location: "westeurope".to_string(),
            sku: StorageSku::StandardSsdLrs,
            disk_size_gb: 64,
            zones: vec!["1".to_string()],
            ..DiskModel::default()
        };
        let disk = Disk::from_model(model, Lifecycle::Sync);

        assert_eq!(disk.size_gb, Field::Set(64));
        assert_eq!(disk.zone, Field::Set("1".to_string()));
        assert_eq!(disk.volume_type, Field::Set(StorageSku::StandardSsdLrs));
        assert_eq!(disk.tags, Field::Set(Tags::new()));
    }
}
