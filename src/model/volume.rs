use super::{AzureModelContext, NameRule};
use crate::tasks::Disk;
use anyhow::Result;
use reconcile::{ModelBuilder, ModelBuilderContext};

/// One managed disk per configured volume
pub struct VolumeBuilder<'a> {
    pub ctx: &'a AzureModelContext<'a>,
}

impl ModelBuilder for VolumeBuilder<'_> {
    fn name(&self) -> &'static str {
        "volumes"
    }

    fn build(&self, c: &mut ModelBuilderContext) -> Result<()> {
        for volume in &self.ctx.cluster.volumes {
            let name = self.ctx.safe_object_name(&volume.name);
            NameRule::Disk.check(&name)?;

            let mut tags = self.ctx.cluster_tags();
            tags.extend(volume.tags.clone());
            tags.insert("clusterup.io/volume".to_string(), volume.name.clone());

            let mut disk = Disk::new(name, self.ctx.region())
                .with_size_gb(volume.size_gb)
                .with_volume_type(volume.volume_type.unwrap_or_default())
                .with_tags(tags)
                .with_lifecycle(volume.lifecycle.unwrap_or_default());
            if let Some(zone) = &volume.zone {
                disk = disk.with_zone(zone.clone());
            }
            c.add_task(disk)?;
        }
        Ok(())
    }
}
