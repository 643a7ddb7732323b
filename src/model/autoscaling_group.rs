use super::{AzureModelContext, NameRule};
use crate::tasks::AvailabilitySet;
use anyhow::Result;
use reconcile::{ModelBuilder, ModelBuilderContext};

const FAULT_DOMAINS: u32 = 2;
const UPDATE_DOMAINS: u32 = 3;

/// One availability set per instance group
pub struct AutoscalingGroupBuilder<'a> {
    pub ctx: &'a AzureModelContext<'a>,
}

impl ModelBuilder for AutoscalingGroupBuilder<'_> {
    fn name(&self) -> &'static str {
        "autoscaling-groups"
    }

    fn build(&self, c: &mut ModelBuilderContext) -> Result<()> {
        for ig in &self.ctx.cluster.instance_groups {
            let name = self.ctx.safe_object_name(&ig.name);
            NameRule::AvailabilitySet.check(&name)?;

            let mut tags = self.ctx.cluster_tags();
            tags.insert("clusterup.io/instance-group".to_string(), ig.name.clone());
            tags.insert("clusterup.io/role".to_string(), ig.role.to_string());

            let set = AvailabilitySet::new(name, self.ctx.region())
                .with_domains(FAULT_DOMAINS, UPDATE_DOMAINS)
                .with_tags(tags)
                .with_lifecycle(ig.lifecycle.unwrap_or_default());
            c.add_task(set)?;
        }
        Ok(())
    }
}
